use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::llm::client_core::{OpenAIClient, Operation};

#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub n: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedImage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub b64_json: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ImageResponse {
    data: Vec<GeneratedImage>,
}

impl OpenAIClient {
    pub async fn generate_images(
        &self,
        req: &ImageRequest,
    ) -> Result<Vec<GeneratedImage>, DispatchError> {
        let resp: ImageResponse = self
            .send_json(Operation::ImageGenerations, &req.model, req)
            .await?;
        if resp.data.is_empty() {
            return Err(DispatchError::MalformedResponse(
                "image response carried no data".into(),
            ));
        }
        Ok(resp.data)
    }

    /// Fetch the bytes of a generated image.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, DispatchError> {
        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| DispatchError::transport("download image", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DispatchError::transport(
                "download image",
                format!("status {status}"),
            ));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DispatchError::transport("read image body", e))?;
        debug!(len = bytes.len(), "downloaded image");
        Ok(bytes.to_vec())
    }
}

/// Generate one image for `prompt`, download it and write it to `out`.
pub async fn generate_to_file(
    client: &OpenAIClient,
    req: &ImageRequest,
    out: &Path,
) -> Result<GeneratedImage> {
    let images = client.generate_images(req).await?;
    let first = images
        .into_iter()
        .next()
        .context("no image generated")?;
    let url = first
        .url
        .as_deref()
        .context("image returned without url (b64_json responses are not supported)")?;
    let bytes = client.download(url).await?;

    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create image dir: {}", parent.display()))?;
    }
    tokio::fs::write(out, &bytes)
        .await
        .with_context(|| format!("write image: {}", out.display()))?;
    info!(path=%out.display(), bytes = bytes.len(), "image saved");
    Ok(first)
}
