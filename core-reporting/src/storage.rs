// =====================================================================================
// File: core-reporting/src/storage.rs
// Description: Atomic report file storage
// =====================================================================================

use crate::report::{FileFormat, ReportKind};
use crate::{ReportingError, ReportingResult};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Writes rendered artefacts under
/// `{base}/{YYYY}/{YYYYMM}/{Kind}_Report_{YYYY-MM-DD}.{ext}`.
///
/// Writes go to a temp file in the target directory followed by a rename, so
/// readers never observe a half-written report.
pub struct ReportFileStore {
    base_dir: PathBuf,
}

impl ReportFileStore {
    pub fn new(base_dir: &str) -> Self {
        Self {
            base_dir: PathBuf::from(base_dir),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Relative path for an artefact of `kind` stamped with `date`.
    pub fn relative_path(
        &self,
        kind: ReportKind,
        format: FileFormat,
        date: DateTime<Utc>,
    ) -> String {
        format!(
            "{}/{}/{}_Report_{}.{}",
            date.format("%Y"),
            date.format("%Y%m"),
            kind.as_str(),
            date.format("%Y-%m-%d"),
            format.extension()
        )
    }

    /// Write the artefact atomically. Returns the relative path.
    pub async fn write(
        &self,
        kind: ReportKind,
        format: FileFormat,
        date: DateTime<Utc>,
        content: &[u8],
    ) -> ReportingResult<String> {
        let relative = self.relative_path(kind, format, date);
        self.write_at(&relative, content).await?;
        Ok(relative)
    }

    /// Write to an explicit relative path, atomically.
    pub async fn write_at(&self, relative: &str, content: &[u8]) -> ReportingResult<()> {
        let target = self.base_dir.join(relative);
        let parent = target
            .parent()
            .ok_or_else(|| ReportingError::Storage(format!("no parent for {}", relative)))?;

        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ReportingError::Storage(format!("create {}: {}", parent.display(), e)))?;

        let temp = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| ReportingError::Storage(format!("write {}: {}", temp.display(), e)))?;
        tokio::fs::rename(&temp, &target)
            .await
            .map_err(|e| ReportingError::Storage(format!("rename {}: {}", target.display(), e)))?;

        info!(path = %target.display(), bytes = content.len(), "Report file written");
        Ok(())
    }

    /// Read an artefact back.
    pub async fn read(&self, relative: &str) -> ReportingResult<Vec<u8>> {
        tokio::fs::read(self.base_dir.join(relative))
            .await
            .map_err(|e| ReportingError::Storage(format!("read {}: {}", relative, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_date() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-11T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_relative_path_layout() {
        let store = ReportFileStore::new("/tmp/reports");
        assert_eq!(
            store.relative_path(ReportKind::CisoWeekly, FileFormat::Html, sample_date()),
            "2024/202403/CISO_Weekly_Report_2024-03-11.html"
        );
        assert_eq!(
            store.relative_path(ReportKind::ItTicket, FileFormat::Json, sample_date()),
            "2024/202403/IT_Ticket_Report_2024-03-11.json"
        );
    }

    #[tokio::test]
    async fn test_write_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportFileStore::new(dir.path().to_str().unwrap());

        let relative = store
            .write(
                ReportKind::CisoWeekly,
                FileFormat::Html,
                sample_date(),
                b"<html>weekly</html>",
            )
            .await
            .unwrap();

        let read_back = store.read(&relative).await.unwrap();
        assert_eq!(read_back, b"<html>weekly</html>");

        // No temp files are left behind.
        let parent = dir.path().join("2024/202403");
        let leftovers: Vec<_> = std::fs::read_dir(parent)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_is_atomic_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportFileStore::new(dir.path().to_str().unwrap());
        let relative = store
            .write(ReportKind::ItTicket, FileFormat::Txt, sample_date(), b"v1")
            .await
            .unwrap();
        store.write_at(&relative, b"v2").await.unwrap();
        assert_eq!(store.read(&relative).await.unwrap(), b"v2");
    }
}
