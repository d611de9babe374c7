use super::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::RunnerError;

/// Writes one pretty-printed JSON document per executed case: `0.json`, `1.json`, ...
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    directory: PathBuf,
}

impl JsonReportWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn render(&self, report: &TestReport) -> Result<String, RunnerError> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    /// Suite level summary, logged once the reports are written
    pub fn summary(
        &self,
        stats: &SuiteStats,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Value {
        json!({
            "run_id": Uuid::new_v4().to_string(),
            "generator": crate::NAME,
            "generator_version": crate::VERSION,
            "start_time": started_at.to_rfc3339(),
            "end_time": finished_at.to_rfc3339(),
            "duration_seconds": (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            "stats": stats,
        })
    }

    /// Clear the directory, then write every report in order
    pub async fn write_all(&self, reports: &[TestReport]) -> Result<Vec<PathBuf>, RunnerError> {
        if tokio::fs::try_exists(&self.directory).await? {
            tokio::fs::remove_dir_all(&self.directory).await?;
        }
        tokio::fs::create_dir_all(&self.directory).await?;

        let mut written = Vec::with_capacity(reports.len());
        for (i, report) in reports.iter().enumerate() {
            let path = self.directory.join(format!("{}.json", i));
            tokio::fs::write(&path, self.render(report)?).await?;
            written.push(path);
        }

        log::info!("Wrote {} reports to {}", written.len(), self.directory.display());
        Ok(written)
    }
}
