// =====================================================================================
// File: core-extraction/src/ai_client.rs
// Description: Client for the external extractor / summariser collaborator
// =====================================================================================

use crate::{ExtractedProduct, ExtractedThreatInfo, ExtractionError, ExtractionOrigin, ExtractionResult, IocBuckets};
use crate::product::ML_MATCH_CONFIDENCE;
use core_config::AiServiceConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    cves: Vec<String>,
    #[serde(default)]
    products: Vec<ExtractedProduct>,
    #[serde(default)]
    ttps: Vec<String>,
    #[serde(default)]
    iocs: IocBuckets,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    summary: String,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    technical_description: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    business_description: String,
}

/// Client for the AI collaborator.
///
/// Health is cached process-locally: a single failed call flips the cache to
/// unhealthy, and it stays unhealthy until a health probe succeeds again.
/// The cache is racy by design; the flip is monotonic within one call path.
pub struct AiServiceClient {
    client: Client,
    base_url: String,
    enabled: bool,
    extract_timeout: Duration,
    health_timeout: Duration,
    healthy: AtomicBool,
}

impl AiServiceClient {
    pub fn new(config: &AiServiceConfig) -> ExtractionResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            enabled: config.enabled,
            extract_timeout: Duration::from_secs(config.timeout_seconds),
            health_timeout: Duration::from_secs(config.health_timeout_seconds),
            healthy: AtomicBool::new(true),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Probe the collaborator's health endpoint, updating the cache.
    pub async fn probe_health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let healthy = match self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Extractor health probe failed");
                false
            }
        };
        self.healthy.store(healthy, Ordering::Relaxed);
        healthy
    }

    /// Run the structured extraction. Errors flip the health cache so the
    /// next caller goes straight to the rule engine until a recheck passes.
    pub async fn extract(&self, text: &str) -> ExtractionResult<ExtractedThreatInfo> {
        if !self.enabled {
            return Err(ExtractionError::Disabled);
        }

        if !self.healthy.load(Ordering::Relaxed) && !self.probe_health().await {
            return Err(ExtractionError::ServiceUnavailable(
                "extractor marked unhealthy".to_string(),
            ));
        }

        let url = format!("{}/api/v1/ai/extract", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.extract_timeout)
            .json(&ExtractRequest { text })
            .send()
            .await
            .map_err(|e| {
                self.healthy.store(false, Ordering::Relaxed);
                ExtractionError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            self.healthy.store(false, Ordering::Relaxed);
            return Err(ExtractionError::ServiceUnavailable(format!(
                "extract endpoint returned {}",
                response.status()
            )));
        }

        let parsed: ExtractResponse = response.json().await.map_err(|e| {
            self.healthy.store(false, Ordering::Relaxed);
            ExtractionError::MalformedResponse(e.to_string())
        })?;

        let mut products = parsed.products;
        for product in &mut products {
            if product.confidence <= 0.0 {
                product.confidence = ML_MATCH_CONFIDENCE;
            }
        }

        Ok(ExtractedThreatInfo {
            cves: parsed.cves,
            products,
            ttps: parsed.ttps,
            iocs: parsed.iocs,
            confidence: parsed.confidence,
            origin: ExtractionOrigin::Ml,
        })
    }

    /// Summarise content in business language.
    pub async fn summarize(
        &self,
        content: &str,
        target_length: Option<u32>,
        language: Option<&str>,
        style: Option<&str>,
    ) -> ExtractionResult<String> {
        if !self.enabled {
            return Err(ExtractionError::Disabled);
        }

        let url = format!("{}/api/v1/ai/summarize", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.extract_timeout)
            .json(&SummarizeRequest {
                content,
                target_length,
                language,
                style,
            })
            .send()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::ServiceUnavailable(format!(
                "summarize endpoint returned {}",
                response.status()
            )));
        }

        let parsed: SummarizeResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;
        Ok(parsed.summary)
    }

    /// Translate a technical description into business language.
    pub async fn translate_to_business(&self, technical: &str) -> ExtractionResult<String> {
        if !self.enabled {
            return Err(ExtractionError::Disabled);
        }

        let url = format!("{}/api/v1/ai/translate-to-business", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.extract_timeout)
            .json(&TranslateRequest {
                technical_description: technical,
            })
            .send()
            .await
            .map_err(|e| ExtractionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Business translation endpoint failed");
            return Err(ExtractionError::ServiceUnavailable(format!(
                "translate endpoint returned {}",
                response.status()
            )));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;
        Ok(parsed.business_description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(enabled: bool) -> AiServiceClient {
        AiServiceClient::new(&AiServiceConfig {
            // Reserved TEST-NET address; connections fail fast.
            base_url: "http://192.0.2.1:9".to_string(),
            enabled,
            timeout_seconds: 1,
            health_timeout_seconds: 1,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_disabled_client_errors() {
        let client = client(false);
        assert!(matches!(
            client.extract("text").await,
            Err(ExtractionError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_failure_flips_health_cache() {
        let client = client(true);
        assert!(client.healthy.load(Ordering::Relaxed));
        let _ = client.extract("text").await;
        assert!(!client.healthy.load(Ordering::Relaxed));
    }

    #[test]
    fn test_extract_response_defaults() {
        let parsed: ExtractResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.cves.is_empty());
        assert!(parsed.products.is_empty());
        assert_eq!(parsed.confidence, 0.0);
    }
}
