// =====================================================================================
// File: core-reporting/src/lib.rs
// Description: Report, ticket and notification emission for the AETIM platform
// =====================================================================================

//! # Core Reporting
//!
//! The emission stage of the pipeline: IT tickets synthesised from
//! high-scoring assessments, the weekly CISO report, and rule-driven mail
//! notifications. Everything here listens to domain events and renders
//! artefacts through templating; delivery failures are recorded, never
//! re-thrown into the event source.

pub mod notification;
pub mod report;
pub mod repository;
pub mod schedule;
pub mod storage;
pub mod templates;
pub mod ticket;
pub mod weekly;

pub use notification::{
    LettreMailer, MailSender, Notification, NotificationEventHandler, NotificationKind,
    NotificationRule, NotificationService, NotificationStatus,
};
pub use report::{FileFormat, Report, ReportKind, TicketPriority, TicketStatus};
pub use repository::{
    InMemoryNotificationRepository, InMemoryNotificationRuleRepository, InMemoryReportRepository,
    NotificationRepository, NotificationRuleRepository, ReportRepository,
};
pub use schedule::{ReportSchedule, ReportScheduleService};
pub use storage::ReportFileStore;
pub use templates::TemplateEngine;
pub use ticket::{TicketAssessmentHandler, TicketGenerationService, TicketView};
pub use weekly::{NoPdfRenderer, PdfRenderer, WeeklyReportService};

use core_utils::ValidationError;
use thiserror::Error;

/// Reporting errors
#[derive(Error, Debug)]
pub enum ReportingError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Illegal ticket transition from '{from}' to '{to}'")]
    IllegalTransition { from: String, to: String },
    #[error("Template error: {0}")]
    Template(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Delivery error: {0}")]
    Delivery(String),
    #[error("Renderer unavailable: {0}")]
    RendererUnavailable(String),
    #[error("Repository error: {0}")]
    Repository(String),
    #[error("Schedule error: {0}")]
    Schedule(String),
}

/// Result type for reporting operations
pub type ReportingResult<T> = Result<T, ReportingError>;
