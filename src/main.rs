//! drive_store CLI - Read and write JSON blobs and figures in Google Drive.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use drive_store::models::format_size;
use drive_store::{
    from_json_compatible, Authenticator, DriveClient, DriveConfig, PdfDocument,
    ServiceAccountAuthenticator, StaticToken, Target, TokenSource,
};

/// Folder read by the default command.
const DEFAULT_FOLDER_PATH: &str = "Stage_Bilbao_Neuroblastoma/G_Collab/backup/__Results__";

/// File read by the default command.
const DEFAULT_FILE_NAME: &str = "result.json";

/// CLI tool for JSON results and figures stored in Google Drive.
#[derive(Parser)]
#[command(name = "drive_store")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Persisted user token.
    #[arg(long, env = "DRIVE_TOKEN_FILE", default_value = "token.json")]
    token_file: PathBuf,

    /// OAuth client secrets, used when an interactive login is needed.
    #[arg(long, env = "DRIVE_CLIENT_SECRETS", default_value = "client_secrets.json")]
    client_secrets: PathBuf,

    /// Authenticate with a service account key instead of the user token.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", conflicts_with = "access_token")]
    service_account: Option<PathBuf>,

    /// Use an already issued bearer token.
    #[arg(long, env = "DRIVE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the id and JSON content of a file found by folder path and name.
    Show {
        /// Folder path below the root.
        #[arg(long, default_value = DEFAULT_FOLDER_PATH)]
        folder: String,

        /// File name inside the folder.
        #[arg(long, default_value = DEFAULT_FILE_NAME)]
        name: String,
    },

    /// List files in a folder.
    Ls {
        /// Folder URL, ID or /path.
        folder: String,
    },

    /// Show file metadata.
    Info {
        /// File URL, ID or /path.
        file: String,

        /// Hours added to the UTC modification time.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        utc_offset: i64,
    },

    /// Show the owner of a file.
    Owner {
        /// File URL, ID or /path.
        file: String,
    },

    /// Print the JSON content of a file.
    Cat {
        /// File URL or ID.
        file: String,
    },

    /// Download a file to local filesystem.
    Download {
        /// File URL or ID to download.
        file: String,

        /// Local destination path.
        #[arg(long, short = 't')]
        to: PathBuf,
    },

    /// Create or overwrite a JSON file in a folder.
    Put {
        /// Local JSON file.
        local: PathBuf,

        /// Destination folder URL, ID or /path.
        #[arg(long, short = 't')]
        to: String,

        /// Remote name (defaults to the local file name).
        #[arg(long)]
        name: Option<String>,
    },

    /// Upload a rendered PDF figure as a new file.
    UploadPdf {
        /// Local PDF file.
        local: PathBuf,

        /// Destination folder URL, ID or /path.
        #[arg(long, short = 't')]
        to: String,

        /// Remote name (defaults to the local file stem).
        #[arg(long)]
        name: Option<String>,

        /// Local copy of the rendered figure (defaults to <NAME>.pdf).
        #[arg(long)]
        keep: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drive_store=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DriveConfig::default()
        .with_token_path(&cli.token_file)
        .with_client_secrets_path(&cli.client_secrets);

    let client = build_client(&cli, &config).await?;

    let command = cli.command.unwrap_or(Commands::Show {
        folder: DEFAULT_FOLDER_PATH.to_string(),
        name: DEFAULT_FILE_NAME.to_string(),
    });

    match command {
        Commands::Show { folder, name } => {
            let folder_id = client
                .resolve_path(&folder)
                .await
                .with_context(|| format!("Failed to resolve folder: {}", folder))?
                .ok_or_else(|| anyhow!("Folder not found: {}", folder))?;

            let file_id = client
                .find_child(&folder_id, &name)
                .await
                .with_context(|| format!("Failed to look up {} in {}", name, folder))?
                .ok_or_else(|| anyhow!("File not found: {}/{}", folder, name))?;
            println!("{}", file_id);

            let data = client
                .load_json(&file_id)
                .await
                .with_context(|| format!("Failed to load JSON from: {}", file_id))?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Ls { folder } => {
            let folder_id = resolve(&client, &folder).await?;
            let listing = client
                .list_children(&folder_id)
                .await
                .with_context(|| format!("Failed to list files in folder: {}", folder_id))?;

            if listing.is_empty() {
                println!("No files found.");
            } else {
                println!("{:<44} {}", "ID", "NAME");
                println!("{}", "-".repeat(60));
                for (name, id) in listing.iter() {
                    println!("{:<44} {}", id, name);
                }
            }
        }

        Commands::Info { file, utc_offset } => {
            let file_id = resolve(&client, &file).await?;
            let info = client
                .file_info(&file_id, utc_offset)
                .await
                .with_context(|| format!("Failed to get metadata for: {}", file_id))?;

            println!("name:     {}", info.name.as_deref().unwrap_or("-"));
            println!("type:     {}", info.mime_type.as_deref().unwrap_or("-"));
            println!(
                "size:     {}",
                info.size.map(format_size).unwrap_or_else(|| "-".to_string())
            );
            println!("modified: {} {} ({})", info.modified_day, info.modified_time, info.modified_time_sec);
            println!("by:       {}", info.last_modifying_user.as_deref().unwrap_or("-"));
        }

        Commands::Owner { file } => {
            let file_id = resolve(&client, &file).await?;
            let owner = client
                .owner(&file_id)
                .await
                .with_context(|| format!("Failed to get owner of: {}", file_id))?;
            println!("{}", owner.as_deref().unwrap_or("-"));
        }

        Commands::Cat { file } => {
            let file_id = resolve(&client, &file).await?;
            let data = client
                .load_json(&file_id)
                .await
                .with_context(|| format!("Failed to load JSON from: {}", file_id))?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Download { file, to } => {
            let file_id = resolve(&client, &file).await?;

            if let Some(parent) = to.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create directory: {:?}", parent))?;
                }
            }

            print!("Downloading {}... ", file_id);
            let written = client
                .download_file(&file_id, &to)
                .await
                .with_context(|| format!("Failed to download file: {}", file_id))?;
            println!("OK ({})", format_size(written));
            println!("Saved to: {:?}", to);
        }

        Commands::Put { local, to, name } => {
            let folder_id = resolve(&client, &to).await?;
            let name = match name {
                Some(name) => name,
                None => file_name(&local)?,
            };

            let content = std::fs::read_to_string(&local)
                .with_context(|| format!("Failed to read {:?}", local))?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {:?}", local))?;

            let id = client
                .upsert_json(&folder_id, &name, &from_json_compatible(value))
                .await
                .with_context(|| format!("Failed to save {} to {}", name, folder_id))?;
            println!("{}", id);
        }

        Commands::UploadPdf {
            local,
            to,
            name,
            keep,
        } => {
            let folder_id = resolve(&client, &to).await?;
            let name = match name {
                Some(name) => name,
                None => local
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("Cannot derive a name from {:?}", local))?,
            };

            let keep = keep.unwrap_or_else(|| PathBuf::from(format!("{}.pdf", name)));

            let figure = PdfDocument::from_file(&local)
                .with_context(|| format!("Failed to read PDF {:?}", local))?;
            let id = client
                .upload_figure(&folder_id, &figure, &name, &keep)
                .await
                .with_context(|| format!("Failed to upload {} to {}", name, folder_id))?;
            println!("{}", id);
        }
    }

    Ok(())
}

/// Pick the token source: bearer token, service account, or the user token file.
async fn build_client(cli: &Cli, config: &DriveConfig) -> Result<DriveClient> {
    if let Some(token) = &cli.access_token {
        return Ok(client_with(Arc::new(StaticToken::new(token.clone())), config));
    }

    if let Some(path) = &cli.service_account {
        let auth = ServiceAccountAuthenticator::from_file(path)
            .with_context(|| format!("Failed to load credentials from {:?}", path))?
            .with_scope(&config.scope);
        return Ok(client_with(Arc::new(auth), config));
    }

    let auth = Authenticator::from_config(config);
    auth.bootstrap().await.context("Authentication failed")?;
    Ok(client_with(Arc::new(auth), config))
}

fn client_with(auth: Arc<dyn TokenSource>, config: &DriveConfig) -> DriveClient {
    DriveClient::new(auth).with_endpoints(&config.api_base, &config.upload_base)
}

async fn resolve(client: &DriveClient, input: &str) -> Result<String> {
    let target = Target::parse(input).with_context(|| format!("Invalid URL, ID or path: {}", input))?;
    client
        .resolve_target(&target)
        .await
        .with_context(|| format!("Failed to resolve: {}", target))?
        .ok_or_else(|| anyhow!("Not found: {}", target))
}

fn file_name(path: &std::path::Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Cannot derive a name from {:?}", path))
}
