// =====================================================================================
// File: core-reporting/src/report.rs
// Description: Report aggregate, ticket state machine and value objects
// =====================================================================================

use crate::{ReportingError, ReportingResult};
use chrono::{DateTime, Utc};
use core_utils::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Kind of rendered artefact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    CisoWeekly,
    ItTicket,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::CisoWeekly => "CISO_Weekly",
            ReportKind::ItTicket => "IT_Ticket",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rendered file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Html,
    Pdf,
    Txt,
    Json,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Html => "html",
            FileFormat::Pdf => "pdf",
            FileFormat::Txt => "txt",
            FileFormat::Json => "json",
        }
    }
}

/// Ticket lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Pending,
    InProgress,
    Completed,
    Closed,
}

impl TicketStatus {
    /// Allowed transitions:
    /// Pending -> {InProgress, Closed}; InProgress -> {Completed, Closed};
    /// Completed -> {Closed}; Closed is terminal.
    pub fn can_transition_to(&self, target: TicketStatus) -> bool {
        matches!(
            (self, target),
            (TicketStatus::Pending, TicketStatus::InProgress)
                | (TicketStatus::Pending, TicketStatus::Closed)
                | (TicketStatus::InProgress, TicketStatus::Completed)
                | (TicketStatus::InProgress, TicketStatus::Closed)
                | (TicketStatus::Completed, TicketStatus::Closed)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketStatus::Pending => write!(f, "Pending"),
            TicketStatus::InProgress => write!(f, "InProgress"),
            TicketStatus::Completed => write!(f, "Completed"),
            TicketStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// Remediation priority tag derived from the final risk score:
/// >= 8 High, >= 6 Medium, else Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketPriority {
    Low,
    Medium,
    High,
}

impl TicketPriority {
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            TicketPriority::High
        } else if score >= 6.0 {
            TicketPriority::Medium
        } else {
            TicketPriority::Low
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketPriority::Low => write!(f, "Low"),
            TicketPriority::Medium => write!(f, "Medium"),
            TicketPriority::High => write!(f, "High"),
        }
    }
}

/// A rendered artefact: a stored report file plus its metadata, or an IT
/// ticket (which additionally walks the ticket state machine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub kind: ReportKind,
    pub title: String,
    /// Path relative to the report store base directory
    pub path: String,
    pub format: FileFormat,
    pub generated_at: DateTime<Utc>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub ai_summary: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Present on IT tickets only
    pub ticket_status: Option<TicketStatus>,
}

impl Report {
    pub fn new_ticket(title: &str, path: &str, format: FileFormat) -> ReportingResult<Self> {
        Validate::not_empty(title, "title")?;
        Ok(Self {
            id: Uuid::new_v4(),
            kind: ReportKind::ItTicket,
            title: title.to_string(),
            path: path.to_string(),
            format,
            generated_at: Utc::now(),
            period_start: None,
            period_end: None,
            ai_summary: None,
            metadata: HashMap::new(),
            ticket_status: Some(TicketStatus::Pending),
        })
    }

    pub fn new_weekly(
        title: &str,
        path: &str,
        format: FileFormat,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> ReportingResult<Self> {
        Validate::not_empty(title, "title")?;
        Ok(Self {
            id: Uuid::new_v4(),
            kind: ReportKind::CisoWeekly,
            title: title.to_string(),
            path: path.to_string(),
            format,
            generated_at: Utc::now(),
            period_start: Some(period_start),
            period_end: Some(period_end),
            ai_summary: None,
            metadata: HashMap::new(),
            ticket_status: None,
        })
    }

    /// Walk the ticket state machine. Returns (old, new) on success.
    pub fn update_ticket_status(
        &mut self,
        target: TicketStatus,
    ) -> ReportingResult<(TicketStatus, TicketStatus)> {
        let Some(current) = self.ticket_status else {
            return Err(ReportingError::IllegalTransition {
                from: "none".to_string(),
                to: target.to_string(),
            });
        };
        if !current.can_transition_to(target) {
            return Err(ReportingError::IllegalTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }
        self.ticket_status = Some(target);
        Ok((current, target))
    }
}
