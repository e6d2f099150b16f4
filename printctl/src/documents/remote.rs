//! Conversion through an external HTTP conversion service.
//!
//! Protocol: the document bytes are POSTed to `{url}/convert?file_type=<ext>&file_name=<name>`. The
//! service answers with a JSON descriptor pointing at the converted PDF, which is downloaded into
//! the attempt's working directory.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use url::Url;

use super::DocumentFormat;
use super::normalizer::{ConversionStrategy, StrategyError};
use crate::config::RemoteConversionConfig;

/// Result descriptor returned by the conversion service.
#[derive(Debug, Deserialize)]
struct ConversionDescriptor {
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct RemoteConversion {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl RemoteConversion {
    pub fn new(config: &RemoteConversionConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: convert_endpoint(&config.url),
            api_key: config.api_key.clone(),
        })
    }

    async fn fetch_descriptor(&self, source: &Path, format: DocumentFormat) -> Result<ConversionDescriptor, StrategyError> {
        let bytes = tokio::fs::read(source).await?;
        let filename = source.file_name().and_then(|n| n.to_str()).unwrap_or("document");

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .query(&[("file_type", format.extension()), ("file_name", filename)])
            .header(CONTENT_TYPE, format.mime_type())
            .body(bytes);
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StrategyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| StrategyError::Descriptor(e.to_string()))
    }
}

/// `{url}/convert`, tolerating a trailing slash on the configured base URL.
fn convert_endpoint(base: &Url) -> Url {
    let mut endpoint = base.clone();
    if let Ok(mut segments) = endpoint.path_segments_mut() {
        segments.pop_if_empty().push("convert");
    }
    endpoint
}

#[async_trait]
impl ConversionStrategy for RemoteConversion {
    fn name(&self) -> &'static str {
        "remote"
    }

    #[instrument(skip(self, output_dir), fields(source = %source.display(), endpoint = %self.endpoint), err)]
    async fn convert(&self, source: &Path, format: DocumentFormat, output_dir: &Path) -> Result<PathBuf, StrategyError> {
        let descriptor = self.fetch_descriptor(source, format).await?;

        let download_url = match (descriptor.download_url, descriptor.error) {
            (Some(url), _) if !url.trim().is_empty() => url,
            (_, Some(error)) => return Err(StrategyError::Descriptor(format!("service reported: {error}"))),
            _ => return Err(StrategyError::Descriptor("missing download_url".to_string())),
        };
        // Relative links are resolved against the service URL
        let download_url = self
            .endpoint
            .join(&download_url)
            .map_err(|e| StrategyError::Descriptor(format!("invalid download_url {download_url:?}: {e}")))?;

        debug!("Downloading converted PDF from {}", download_url);
        let response = self.client.get(download_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StrategyError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let pdf = response.bytes().await?;
        if pdf.is_empty() {
            return Err(StrategyError::NoOutput("service returned an empty document".to_string()));
        }

        let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
        let output = output_dir.join(format!("{stem}.pdf"));
        tokio::fs::write(&output, &pdf).await?;
        Ok(output)
    }
}
