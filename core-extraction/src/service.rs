// =====================================================================================
// File: core-extraction/src/service.rs
// Description: Extraction service with mandatory rule-engine fallback
// =====================================================================================

use crate::{
    AiServiceClient, CveExtractor, ExtractedThreatInfo, ExtractionOrigin, IocExtractor,
    ProductExtractor, TtpExtractor,
};
use crate::product::KEYWORD_MATCH_CONFIDENCE;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The composed rule engine. Deterministic: the same text always produces
/// the same result.
#[derive(Debug, Default, Clone)]
pub struct RuleEngine {
    cve: CveExtractor,
    ioc: IocExtractor,
    ttp: TtpExtractor,
    product: ProductExtractor,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract(&self, text: &str) -> ExtractedThreatInfo {
        ExtractedThreatInfo {
            cves: self.cve.extract_all(text),
            products: self.product.extract(text),
            ttps: self.ttp.extract(text),
            iocs: self.ioc.extract(text),
            confidence: KEYWORD_MATCH_CONFIDENCE,
            origin: ExtractionOrigin::Rule,
        }
    }
}

/// Extraction front door used by the collection pipeline.
///
/// Prefers the ML collaborator when it is configured and healthy; any
/// failure (disabled, unhealthy, timeout, malformed output) degrades to the
/// rule engine. The rule path cannot be turned off.
pub struct ExtractionService {
    rules: RuleEngine,
    ai: Option<Arc<AiServiceClient>>,
}

impl ExtractionService {
    pub fn new(ai: Option<Arc<AiServiceClient>>) -> Self {
        Self {
            rules: RuleEngine::new(),
            ai,
        }
    }

    /// Rule-engine-only service, used where the collaborator is not wired.
    pub fn rules_only() -> Self {
        Self::new(None)
    }

    /// Extract threat entities from free text.
    pub async fn extract(&self, text: &str) -> ExtractedThreatInfo {
        if let Some(ai) = &self.ai {
            if ai.is_enabled() {
                match ai.extract(text).await {
                    Ok(info) => {
                        info!(
                            cves = info.cves.len(),
                            products = info.products.len(),
                            confidence = info.confidence,
                            "Extraction served by ML collaborator"
                        );
                        return info;
                    }
                    Err(e) => {
                        warn!(error = %e, "ML extraction failed, falling back to rule engine");
                    }
                }
            } else {
                debug!("ML extraction disabled, using rule engine");
            }
        }

        self.rules.extract(text)
    }

    /// Direct access to the rule engine, bypassing the collaborator.
    pub fn extract_with_rules(&self, text: &str) -> ExtractedThreatInfo {
        self.rules.extract(text)
    }
}
