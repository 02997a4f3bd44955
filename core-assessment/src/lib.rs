// =====================================================================================
// File: core-assessment/src/lib.rs
// Description: Correlation and risk assessment engine for the AETIM platform
// =====================================================================================

//! # Core Assessment
//!
//! The analysis half of the platform: fuzzy matching of threats to inventory
//! assets across product-name variants and version ranges, operator-defined
//! priority intelligence rules, and the deterministic risk formula with its
//! immutable scoring history. Listens to `ThreatIngested`, publishes
//! `AssociationCreated` and `RiskAssessmentCompleted`.

pub mod asset;
pub mod association;
pub mod pir;
pub mod product_match;
pub mod risk;
pub mod service;
pub mod version_match;

pub use asset::{Asset, AssetDirectory, AssetProduct, InMemoryAssetDirectory, WeightTier};
pub use association::{
    Association, AssociationAnalysisService, AssociationCandidate, AssociationRepository,
    InMemoryAssociationRepository, MatchKind,
};
pub use pir::{InMemoryPirRepository, Pir, PirConditionType, PirPriority, PirRepository};
pub use product_match::{lcs_ratio, normalize_product_name};
pub use risk::{
    InMemoryRiskAssessmentRepository, InMemoryRiskHistoryRepository, RiskAssessment,
    RiskAssessmentRepository, RiskCalculationService, RiskHistoryEntry, RiskHistoryRepository,
    RiskLevel,
};
pub use service::{AssessmentService, AssociationCreatedHandler, ThreatIngestedHandler};

use core_utils::ValidationError;
use thiserror::Error;

/// Assessment errors
#[derive(Error, Debug)]
pub enum AssessmentError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Repository error: {0}")]
    Repository(String),
    #[error("Invariant violated: {0}")]
    Invariant(String),
    #[error("Threat pipeline error: {0}")]
    ThreatIntel(#[from] core_threat_intel::ThreatIntelError),
}

/// Result type for assessment operations
pub type AssessmentResult<T> = Result<T, AssessmentError>;
