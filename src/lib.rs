//! drive_store - Read and write JSON blobs and figures in Google Drive.
//!
//! This library provides functionality to:
//! - Authenticate a user through a persisted token file, refreshing it or
//!   falling back to an interactive login
//! - Resolve folder paths and file names to Drive object ids
//! - Read metadata, load JSON content and download files
//! - Upsert JSON-compatible structures (with numeric arrays) by name
//! - Upload rendered figures as PDF
//!
//! # Example
//!
//! ```no_run
//! use drive_store::{DriveClient, DriveConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DriveClient::connect(&DriveConfig::default()).await?;
//!
//!     let folder = client.resolve_path("backup/__Results__").await?;
//!     if let Some(folder) = folder {
//!         for (name, id) in client.list_children(&folder).await?.iter() {
//!             println!("{}\t{}", id, name);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod compat;
pub mod config;
pub mod credential;
pub mod error;
pub mod figure;
pub mod login;
pub mod models;
pub mod target;

// Re-exports for convenience
pub use auth::{Authenticator, ServiceAccountAuthenticator, StaticToken, TokenSource};
pub use client::{ChildListing, DriveClient, ROOT_ID};
pub use compat::{from_json_compatible, to_json_compatible, DType, Data, NumericArray};
pub use config::DriveConfig;
pub use credential::{Credential, TokenStore};
pub use error::{DriveError, Result};
pub use figure::{Figure, PdfDocument};
pub use login::{LoginFlow, LoopbackLogin};
pub use models::{FileInfo, FileMetadata, ModifiedTime};
pub use target::Target;
