//! Google Drive API client: lookups, metadata and content transfer.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::auth::{Authenticator, TokenSource};
use crate::compat::{to_json_compatible, Data};
use crate::config::{DriveConfig, DRIVE_API_BASE, UPLOAD_API_BASE};
use crate::error::{DriveError, Result};
use crate::figure::Figure;
use crate::models::{
    ApiErrorResponse, CreatedFile, FileInfo, FileListResponse, OwnersResponse, RawFileInfo,
    FOLDER_MIME_TYPE,
};
use crate::target::Target;

/// Identifier Google Drive accepts for the top of "My Drive".
pub const ROOT_ID: &str = "root";

const JSON_MIME_TYPE: &str = "application/json";
const PDF_MIME_TYPE: &str = "application/pdf";

/// Names and ids of a folder's children, index-aligned, in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildListing {
    pub names: Vec<String>,
    pub ids: Vec<String>,
}

impl ChildListing {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// `(name, id)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.ids.iter().map(String::as_str))
    }
}

/// Client for a user's Google Drive.
pub struct DriveClient {
    auth: Arc<dyn TokenSource>,
    http: Client,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Create a client that takes its bearer tokens from `auth`.
    pub fn new(auth: Arc<dyn TokenSource>) -> Self {
        Self {
            auth,
            http: Client::new(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
        }
    }

    pub fn with_endpoints(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self
    }

    /// Authenticate the user (token file, refresh or login) and return a
    /// ready client.
    pub async fn connect(config: &DriveConfig) -> Result<Self> {
        let auth = Authenticator::from_config(config);
        auth.bootstrap().await?;
        Ok(Self::new(Arc::new(auth)).with_endpoints(&config.api_base, &config.upload_base))
    }

    /// Run one files.list query; only the first page is read.
    async fn query_page(&self, query: &str, fields: &str) -> Result<FileListResponse> {
        let token = self.auth.access_token().await?;
        debug!(q = %query, "files.list");

        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[("q", query), ("fields", fields)])
            .send()
            .await?;

        let list: FileListResponse = check_response(response).await?.json().await?;
        if list.next_page_token.is_some() {
            warn!(q = %query, "more results available, only the first page is used");
        }
        Ok(list)
    }

    /// Immediate, non-trashed children of a folder.
    pub async fn list_children(&self, folder_id: &str) -> Result<ChildListing> {
        let query = format!("'{}' in parents and trashed = false", escape(folder_id));
        let list = self
            .query_page(&query, "nextPageToken, files(id, name)")
            .await?;

        let mut listing = ChildListing::default();
        for file in list.files {
            listing.names.push(file.name);
            listing.ids.push(file.id);
        }
        Ok(listing)
    }

    /// Walk a `/`-separated folder path from the root.
    ///
    /// Empty segments are skipped, so `""` and `"/"` resolve to [`ROOT_ID`].
    /// Returns `None` at the first segment without a matching folder; when
    /// several folders share a name the first one returned wins.
    pub async fn resolve_path(&self, path: &str) -> Result<Option<String>> {
        let mut current = ROOT_ID.to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let query = format!(
                "'{}' in parents and name = '{}' and mimeType = '{}' and trashed = false",
                escape(&current),
                escape(segment),
                FOLDER_MIME_TYPE
            );
            let list = self.query_page(&query, "nextPageToken, files(id)").await?;
            match list.files.into_iter().next() {
                Some(folder) => current = folder.id,
                None => {
                    debug!(segment, path, "path segment not found");
                    return Ok(None);
                }
            }
        }
        Ok(Some(current))
    }

    /// Find a file or folder by exact name directly inside a folder.
    pub async fn find_child(&self, folder_id: &str, name: &str) -> Result<Option<String>> {
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            escape(folder_id),
            escape(name)
        );
        let list = self.query_page(&query, "nextPageToken, files(id)").await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    pub async fn resolve_target(&self, target: &Target) -> Result<Option<String>> {
        match target {
            Target::Id(id) => Ok(Some(id.clone())),
            Target::Path(path) => self.resolve_path(path).await,
        }
    }

    /// Fetch metadata with a field projection.
    async fn get_fields<T: DeserializeOwned>(&self, file_id: &str, fields: &str) -> Result<T> {
        let token = self.auth.access_token().await?;
        debug!(file_id, fields, "files.get");

        let response = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("fields", fields)])
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }

    /// Name, type, size, last modifying user and modification time shifted
    /// by `utc_offset_hours`.
    pub async fn file_info(&self, file_id: &str, utc_offset_hours: i64) -> Result<FileInfo> {
        let raw: RawFileInfo = self
            .get_fields(file_id, "modifiedTime, name, lastModifyingUser, mimeType, size")
            .await?;
        FileInfo::from_raw(raw, utc_offset_hours)
    }

    /// Display name of the first owner.
    pub async fn owner(&self, file_id: &str) -> Result<Option<String>> {
        let owners: OwnersResponse = self.get_fields(file_id, "owners").await?;
        Ok(owners.owners.into_iter().next().and_then(|u| u.display_name))
    }

    async fn get_media(&self, file_id: &str) -> Result<Response> {
        let token = self.auth.access_token().await?;
        debug!(file_id, "files.get media");

        let response = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .send()
            .await?;

        check_response(response).await
    }

    /// Download a file's content and parse it as JSON.
    pub async fn load_json(&self, file_id: &str) -> Result<serde_json::Value> {
        let bytes = self.get_media(file_id).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Stream a file's content to `destination`, returning the bytes written.
    ///
    /// A transfer error leaves the partially written file in place.
    pub async fn download_file<P: AsRef<Path>>(&self, file_id: &str, destination: P) -> Result<u64> {
        let destination = destination.as_ref();
        let response = self.get_media(file_id).await?;

        let mut file = File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            debug!(file_id, written, "chunk written");
        }

        file.flush().await?;
        info!(file_id, bytes = written, "downloaded to {}", destination.display());
        Ok(written)
    }

    /// Create `name` in `folder_id` or overwrite the content of an existing
    /// object with that name. Returns the object id.
    ///
    /// The existence check does not exclude trashed objects.
    pub async fn upsert_json(&self, folder_id: &str, name: &str, data: &Data) -> Result<String> {
        let query = format!("name = '{}' and '{}' in parents", escape(name), escape(folder_id));
        let existing = self.query_page(&query, "files(id)").await?.files.into_iter().next();

        let content = serde_json::to_vec(&to_json_compatible(data))?;

        match existing {
            Some(file) => {
                let id = self.update_media(&file.id, JSON_MIME_TYPE, content).await?;
                info!(id = %id, name, "file updated");
                Ok(id)
            }
            None => {
                let part = Part::bytes(content)
                    .file_name(name.to_string())
                    .mime_str(JSON_MIME_TYPE)?;
                let id = self.create_file(name, folder_id, part).await?;
                info!(id = %id, name, "file uploaded");
                Ok(id)
            }
        }
    }

    /// Render `figure` and upload it as a new PDF object named `name`.
    ///
    /// The figure is written to a temporary `.pdf` for the upload and to
    /// `local_copy`. No existence check is made: uploading the same name
    /// twice yields two objects.
    pub async fn upload_figure<P: AsRef<Path>>(
        &self,
        folder_id: &str,
        figure: &dyn Figure,
        name: &str,
        local_copy: P,
    ) -> Result<String> {
        let tmp = tempfile::Builder::new()
            .prefix("figure-")
            .suffix(".pdf")
            .tempfile()?;
        figure.save_pdf(tmp.path())?;
        figure.save_pdf(local_copy.as_ref())?;

        let file = File::open(tmp.path()).await?;
        let length = file.metadata().await?.len();
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(format!("{}.pdf", name))
            .mime_str(PDF_MIME_TYPE)?;

        let id = self.create_file(name, folder_id, part).await?;
        info!(id = %id, name, "figure uploaded");
        Ok(id)
    }

    /// Multipart create with `{name, parents: [parent_id]}` metadata.
    async fn create_file(&self, name: &str, parent_id: &str, media: Part) -> Result<String> {
        let token = self.auth.access_token().await?;

        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id]
        });

        let metadata_part = Part::text(metadata.to_string()).mime_str(JSON_MIME_TYPE)?;
        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", media);

        debug!(name, parent_id, "files.create");
        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .multipart(form)
            .send()
            .await?;

        let created: CreatedFile = check_response(response).await?.json().await?;
        Ok(created.id)
    }

    /// Replace an object's content, keeping its metadata.
    async fn update_media(&self, file_id: &str, mime_type: &str, content: Vec<u8>) -> Result<String> {
        let token = self.auth.access_token().await?;

        debug!(file_id, "files.update media");
        let response = self
            .http
            .patch(format!("{}/files/{}", self.upload_base, file_id))
            .bearer_auth(&token)
            .query(&[("uploadType", "media"), ("fields", "id")])
            .header("Content-Type", mime_type)
            .body(content)
            .send()
            .await?;

        let updated: CreatedFile = check_response(response).await?.json().await?;
        Ok(updated.id)
    }
}

/// Turn a non-success response into `DriveError::ApiError`.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}

/// Escape a literal for use inside single quotes in a Drive query.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_quotes_and_backslashes() {
        assert_eq!(escape("result.json"), "result.json");
        assert_eq!(escape("Bob's plots"), "Bob\\'s plots");
        assert_eq!(escape("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_child_listing_pairs() {
        let listing = ChildListing {
            names: vec!["a.json".to_string(), "b".to_string()],
            ids: vec!["1".to_string(), "2".to_string()],
        };
        let pairs: Vec<_> = listing.iter().collect();
        assert_eq!(pairs, vec![("a.json", "1"), ("b", "2")]);
        assert_eq!(listing.len(), 2);
    }
}
