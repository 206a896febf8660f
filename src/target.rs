//! Command-line references to remote objects: Drive URLs, raw ids or paths.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DriveError, Result};

/// Folder, file and `open?id=` share links.
static SHARE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://drive\.google\.com/(?:drive/(?:u/\d+/)?folders/|file/d/|open\?id=)([a-zA-Z0-9_-]+)",
    )
    .expect("Invalid share URL regex")
});

/// Valid Google Drive ID pattern (alphanumeric, underscore, hyphen).
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// Where a command should look for a remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An object identifier, used as is.
    Id(String),
    /// A `/`-separated folder path below `root`.
    Path(String),
}

impl Target {
    /// Parse a share URL, a raw id, or a path starting with `/`.
    ///
    /// ```
    /// use drive_store::Target;
    ///
    /// let t = Target::parse("https://drive.google.com/drive/folders/1abc123").unwrap();
    /// assert_eq!(t, Target::Id("1abc123".to_string()));
    ///
    /// let t = Target::parse("/backup/__Results__").unwrap();
    /// assert_eq!(t, Target::Path("/backup/__Results__".to_string()));
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if trimmed.starts_with('/') {
            return Ok(Target::Path(trimmed.to_string()));
        }

        if let Some(id) = SHARE_URL_REGEX.captures(trimmed).and_then(|c| c.get(1)) {
            return Ok(Target::Id(id.as_str().to_string()));
        }

        if ID_REGEX.is_match(trimmed) {
            return Ok(Target::Id(trimmed.to_string()));
        }

        Err(DriveError::InvalidTarget(input.to_string()))
    }
}

impl FromStr for Target {
    type Err = DriveError;

    fn from_str(s: &str) -> Result<Self> {
        Target::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "{}", id),
            Target::Path(path) => write!(f, "{}", path),
        }
    }
}
