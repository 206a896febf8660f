//! Tests for parsing command-line targets.

use drive_store::Target;

fn id(s: &str) -> Target {
    Target::Id(s.to_string())
}

mod share_urls {
    use super::*;

    #[test]
    fn folder_url() {
        let url = "https://drive.google.com/drive/folders/1abc123XYZ-_def456";
        assert_eq!(Target::parse(url).unwrap(), id("1abc123XYZ-_def456"));
    }

    #[test]
    fn folder_url_with_user() {
        let url = "https://drive.google.com/drive/u/1/folders/1abc123XYZ?usp=sharing";
        assert_eq!(Target::parse(url).unwrap(), id("1abc123XYZ"));
    }

    #[test]
    fn file_url_with_view() {
        let url = "http://drive.google.com/file/d/1abc123XYZ/view";
        assert_eq!(Target::parse(url).unwrap(), id("1abc123XYZ"));
    }

    #[test]
    fn open_url() {
        let url = "https://drive.google.com/open?id=1abc123XYZ";
        assert_eq!(Target::parse(url).unwrap(), id("1abc123XYZ"));
    }
}

mod ids_and_paths {
    use super::*;

    #[test]
    fn raw_id_trimmed() {
        assert_eq!(Target::parse("\t1abc-123_XYZ\n").unwrap(), id("1abc-123_XYZ"));
    }

    #[test]
    fn absolute_path() {
        let parsed: Target = "/Stage/G_Collab/backup".parse().unwrap();
        assert_eq!(parsed, Target::Path("/Stage/G_Collab/backup".to_string()));
    }

    #[test]
    fn path_segments_may_contain_spaces() {
        assert_eq!(
            Target::parse("/My Drive folder/sub").unwrap(),
            Target::Path("/My Drive folder/sub".to_string())
        );
    }
}

mod invalid_inputs {
    use super::*;

    #[test]
    fn empty_or_whitespace() {
        assert!(Target::parse("").is_err());
        assert!(Target::parse("  \t").is_err());
    }

    #[test]
    fn foreign_url() {
        assert!(Target::parse("https://example.com/folder/123").is_err());
        assert!(Target::parse("https://drive.google.com/drive/").is_err());
    }

    #[test]
    fn relative_path_is_not_an_id() {
        assert!(Target::parse("backup/__Results__").is_err());
        assert!(Target::parse("abc 123").is_err());
    }
}
