use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN};
use serde_json::{json, Value};

const X_APP_SECRET: &str = "x-app-secret";
const X_IS_BASE64_ENCODED: &str = "x-is-base64-encoded";

#[derive(Parser)]
#[command(name = "summarizer-cli")]
#[command(about = "Upload documents to the summarizer proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Origin header to send, as a browser would.
    #[arg(long)]
    origin: Option<String>,

    /// Shared secret for proxies that require X-App-Secret.
    #[arg(long, env = "PROXY_APP_SECRET")]
    secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the proxy is up
    Health,
    /// Upload a file for summarization
    Upload {
        file: PathBuf,

        /// Send as multipart/form-data instead of base64 JSON
        #[arg(long)]
        multipart: bool,

        /// Proxy path to post to
        #[arg(long, default_value = "/summarize")]
        path: String,

        /// Write a binary response here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    let mut headers = HeaderMap::new();
    if let Some(origin) = &cli.origin {
        headers.insert(ORIGIN, HeaderValue::from_str(origin)?);
    }
    if let Some(secret) = &cli.secret {
        headers.insert(X_APP_SECRET, HeaderValue::from_str(secret)?);
    }

    match cli.command {
        Commands::Health => {
            let res = client
                .get(format!("{}/health", base))
                .headers(headers)
                .send()
                .await?;
            print_response(res, None).await?;
        }
        Commands::Upload {
            file,
            multipart,
            path,
            output,
        } => {
            let bytes = tokio::fs::read(&file).await?;
            let filename = file_name(&file);
            let request = client.post(format!("{}{}", base, path)).headers(headers);

            let request = if multipart {
                let part = reqwest::multipart::Part::bytes(bytes)
                    .file_name(filename)
                    .mime_str(mime_for(&file))?;
                request.multipart(reqwest::multipart::Form::new().part("file", part))
            } else {
                request.json(&json!({ "filename": filename, "content": B64.encode(&bytes) }))
            };

            let res = request.send().await?;
            print_response(res, output.as_deref()).await?;
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

async fn print_response(
    res: reqwest::Response,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let base64_body = res
        .headers()
        .get(X_IS_BASE64_ENCODED)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let body = res.bytes().await?;

    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
        eprintln!("Response: {}", String::from_utf8_lossy(&body));
        std::process::exit(1);
    }

    if base64_body {
        let decoded = B64.decode(&body)?;
        match output {
            Some(path) => {
                tokio::fs::write(path, &decoded).await?;
                println!("Wrote {} bytes to {}", decoded.len(), path.display());
            }
            None => eprintln!("Binary response ({} bytes); pass --output to save it", decoded.len()),
        }
        return Ok(());
    }

    match serde_json::from_slice::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", String::from_utf8_lossy(&body)),
    }
    Ok(())
}
