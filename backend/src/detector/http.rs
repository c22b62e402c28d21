//! HTTP client for a model server exposing `POST /v1/detect`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use visionq_common::{Detection, ImageItem};

use super::{Detector, DetectorError, ItemDetections};

/// Client for the detection model server.
pub struct HttpDetector {
    http_client: Client,
    base_url: String,
    confidence: f32,
}

/// Model server response format.
#[derive(Debug, Deserialize)]
struct DetectResponse {
    results: Vec<DetectResult>,
}

#[derive(Debug, Deserialize)]
struct DetectResult {
    name: String,
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpDetector {
    pub fn new(base_url: &str, confidence: f32, request_timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            confidence,
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, items: &[ImageItem]) -> Result<Vec<ItemDetections>, DetectorError> {
        let mut form = Form::new().text("confidence", self.confidence.to_string());
        for item in items {
            let part = Part::bytes(item.bytes.clone()).file_name(item.name.clone());
            form = form.part("file", part);
        }

        let url = format!("{}/v1/detect", self.base_url);
        tracing::debug!("Sending {} image(s) to detector: {}", items.len(), url);

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DetectorError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Backend(format!("{}: {}", status, body)));
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| ItemDetections {
                name: r.name,
                outcome: match r.error {
                    Some(error) => Err(error),
                    None => Ok(r.detections),
                },
            })
            .collect())
    }
}
