use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Hosted GGML conversions of the Whisper models
const GGML_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Models known to exist upstream; anything else gets a warning but is still
/// attempted, so newly published sizes keep working
const KNOWN_MODELS: [&str; 10] = [
    "tiny", "tiny.en", "base", "base.en", "small", "small.en", "medium", "medium.en", "large-v2",
    "large-v3",
];

/// A plausible lower bound for a real model file; anything smaller is a
/// truncated download
const MIN_MODEL_BYTES: u64 = 1_000_000;

/// Get the models directory path
fn get_models_dir() -> Result<PathBuf> {
    let home_dir = std::env::var("HOME").context("Failed to get HOME directory")?;
    let models_dir = PathBuf::from(format!("{}/.cache/confab/models", home_dir));

    if !models_dir.exists() {
        println!("Creating models directory: {:?}", models_dir);
        fs::create_dir_all(&models_dir).context("Failed to create models directory")?;
    }

    Ok(models_dir)
}

/// Normalize a configured model name to its GGML file name
/// ("base.en" and "ggml-base.en.bin" both resolve to "ggml-base.en.bin")
pub fn model_filename(model: &str) -> String {
    let name = model.strip_prefix("ggml-").unwrap_or(model);
    let name = name.strip_suffix(".bin").unwrap_or(name);
    format!("ggml-{}.bin", name)
}

fn model_short_name(model: &str) -> String {
    let name = model.strip_prefix("ggml-").unwrap_or(model);
    name.strip_suffix(".bin").unwrap_or(name).to_string()
}

/// Checks whether a previously downloaded model file looks usable
fn is_model_valid(path: &PathBuf) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => metadata.len() > MIN_MODEL_BYTES,
        Err(_) => false,
    }
}

/// Resolve the model file on disk, downloading it on first use
pub async fn ensure_whisper_model(model: &str) -> Result<PathBuf> {
    let models_dir = get_models_dir()?;
    let filename = model_filename(model);
    let model_path = models_dir.join(&filename);

    if is_model_valid(&model_path) {
        return Ok(model_path);
    }

    let short = model_short_name(model);
    if !KNOWN_MODELS.contains(&short.as_str()) {
        println!(
            "Model '{}' is not a known Whisper size; attempting download anyway",
            short
        );
    }

    let url = format!("{}/{}", GGML_BASE_URL, filename);
    println!("Downloading Whisper model '{}' from {}", short, url);

    download_file(&url, &model_path).await.with_context(|| {
        format!(
            "Failed to download model '{}'. Check the network connection or place \
            the file at {:?} manually.",
            short, model_path
        )
    })?;

    if !is_model_valid(&model_path) {
        let _ = fs::remove_file(&model_path);
        return Err(anyhow!("Downloaded model file looks truncated"));
    }

    println!("Model ready at {:?}", model_path);
    Ok(model_path)
}

async fn download_file(url: &str, dest: &PathBuf) -> Result<()> {
    let mut response = reqwest::get(url).await.context("Request failed")?;

    if !response.status().is_success() {
        return Err(anyhow!("Server returned status {}", response.status()));
    }

    let total_bytes = response.content_length();
    let partial_path = dest.with_extension("bin.partial");
    let mut file = tokio::fs::File::create(&partial_path)
        .await
        .context("Failed to create model file")?;

    let mut downloaded: u64 = 0;
    let mut last_report: u64 = 0;
    while let Some(chunk) = response.chunk().await.context("Download interrupted")? {
        file.write_all(&chunk)
            .await
            .context("Failed to write model file")?;
        downloaded += chunk.len() as u64;

        // Progress every ~50 MB to keep startup output readable
        if downloaded - last_report >= 50 * 1024 * 1024 {
            last_report = downloaded;
            match total_bytes {
                Some(total) => println!(
                    "  {:.0} / {:.0} MB",
                    downloaded as f64 / 1e6,
                    total as f64 / 1e6
                ),
                None => println!("  {:.0} MB", downloaded as f64 / 1e6),
            }
        }
    }

    file.flush().await.context("Failed to flush model file")?;
    drop(file);

    fs::rename(&partial_path, dest).context("Failed to move model into place")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_normalize() {
        assert_eq!(model_filename("base.en"), "ggml-base.en.bin");
        assert_eq!(model_filename("ggml-base.en.bin"), "ggml-base.en.bin");
        assert_eq!(model_filename("tiny"), "ggml-tiny.bin");
        assert_eq!(model_filename("large-v3.bin"), "ggml-large-v3.bin");
    }

    #[test]
    fn short_names_round_trip() {
        assert_eq!(model_short_name("ggml-base.en.bin"), "base.en");
        assert_eq!(model_short_name("medium"), "medium");
    }
}
