use anyhow::{bail, Context, Result};
use clap::Parser;
use common::{ErrorResponse, PredictionResult};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use telemetry::correlation::generate_correlation_id;
use telemetry::http_tracing::{add_correlation_id_header, create_traced_client};

#[derive(Parser)]
#[command(name = "mood-client", about = "Upload a face image to the mood service")]
struct Cli {
    /// Image to classify (JPEG or PNG)
    image: PathBuf,

    /// Prediction endpoint
    #[arg(long, default_value = "http://127.0.0.1:5000/predict")]
    url: String,
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let data = tokio::fs::read(&cli.image)
        .await
        .with_context(|| format!("Failed to read {}", cli.image.display()))?;
    let file_name = cli
        .image
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let part = Part::bytes(data)
        .file_name(file_name)
        .mime_str(mime_for(&cli.image))?;
    let form = Form::new().part("file", part);

    let correlation_id = generate_correlation_id();
    tracing::debug!(url = %cli.url, correlation_id = %correlation_id, "uploading image");

    let client = create_traced_client()?;
    let response = add_correlation_id_header(client.post(&cli.url), &correlation_id)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", cli.url))?;

    let status = response.status();
    if status.is_success() {
        let prediction: PredictionResult = response
            .json()
            .await
            .context("Invalid prediction response")?;
        println!("Emotion Detected: {}", prediction.emotion);
        println!("Quote: {}", prediction.quote);
        match prediction.song.as_str() {
            Some(song) => println!("Song: {}", song),
            None => println!("Song: {}", prediction.song),
        }
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => println!("Error: {} {}", status.as_u16(), err.error),
        Err(_) => println!("Error: {} {}", status.as_u16(), body),
    }
    bail!("server responded with {}", status)
}
