//! Local history of benchmark reports
//!
//! Stores data in:
//! - Linux: ~/.local/share/device-bench/
//! - macOS: ~/Library/Application Support/device-bench/
//! - Windows: %APPDATA%/device-bench/
//!
//! Composite reports go to `reports/<id>.json`, sustained runs to
//! `sustained/<id>.json`. Unreadable files are renamed to `.invalid` and skipped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bench::RunMode;
use crate::coordinator::{CompositeReport, ReportSink};
use crate::scoring::Grade;
use crate::sustained::SustainedRunResult;

const REPORTS_DIR: &str = "reports";
const SUSTAINED_DIR: &str = "sustained";

pub struct LocalStorage {
    data_dir: PathBuf,
}

/// One line of `history` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub mode: RunMode,
    pub overall_score: u32,
    pub overall_grade: Grade,
    pub storage_estimated: bool,
}

impl From<&CompositeReport> for ReportSummary {
    fn from(report: &CompositeReport) -> Self {
        Self {
            id: report.id,
            started_at: report.started_at,
            mode: report.mode,
            overall_score: report.overall_score,
            overall_grade: report.overall_grade,
            storage_estimated: report.storage_is_estimated(),
        }
    }
}

impl LocalStorage {
    /// Open storage in the platform data directory.
    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "device-bench", "device-bench")
            .context("Could not determine project directories")?;
        Self::open(dirs.data_dir().to_path_buf())
    }

    /// Open storage rooted at `data_dir`, creating directories if needed.
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        for sub in [REPORTS_DIR, SUSTAINED_DIR] {
            let dir = data_dir.join(sub);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        }
        Ok(Self { data_dir })
    }

    pub fn save_report(&self, report: &CompositeReport) -> Result<PathBuf> {
        self.write_record(REPORTS_DIR, report.id, report)
    }

    pub fn load_report(&self, id: &str) -> Result<CompositeReport> {
        self.read_record(REPORTS_DIR, id)
    }

    /// Summaries of every stored report, newest first.
    pub fn list_reports(&self) -> Result<Vec<ReportSummary>> {
        let reports: Vec<CompositeReport> = self.read_all(REPORTS_DIR)?;
        let mut summaries: Vec<ReportSummary> = reports.iter().map(ReportSummary::from).collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }

    pub fn save_sustained(&self, result: &SustainedRunResult) -> Result<PathBuf> {
        self.write_record(SUSTAINED_DIR, result.id, result)
    }

    /// Stored sustained runs, newest first.
    pub fn list_sustained(&self) -> Result<Vec<SustainedRunResult>> {
        let mut results: Vec<SustainedRunResult> = self.read_all(SUSTAINED_DIR)?;
        results.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(results)
    }

    fn write_record<T: Serialize>(&self, kind: &str, id: Uuid, record: &T) -> Result<PathBuf> {
        let path = self.data_dir.join(kind).join(format!("{id}.json"));
        let json = serde_json::to_string_pretty(record)
            .with_context(|| format!("Failed to serialize {kind} record"))?;

        let mut file = open_private_file(&path)
            .with_context(|| format!("Failed to create record at {}", path.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write record to {}", path.display()))?;

        debug!(path = %path.display(), "Saved {kind} record");
        Ok(path)
    }

    fn read_record<T: DeserializeOwned>(&self, kind: &str, id: &str) -> Result<T> {
        let id = id.trim();
        if !is_valid_record_id(id) {
            anyhow::bail!("Invalid record id: {id}");
        }
        let path = self.data_dir.join(kind).join(format!("{id}.json"));
        let content =
            fs::read_to_string(&path).with_context(|| format!("Record '{id}' not found"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse record: {}", path.display()))
    }

    fn read_all<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<T>> {
        let dir = self.data_dir.join(kind);
        let mut records = Vec::new();
        if !dir.exists() {
            return Ok(records);
        }

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|content| serde_json::from_str::<T>(&content).map_err(Into::into));
            match parsed {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable record");
                    let _ = quarantine_corrupt_record(&path);
                }
            }
        }
        Ok(records)
    }
}

impl ReportSink for LocalStorage {
    fn persist(&self, report: &CompositeReport) -> Result<()> {
        self.save_report(report).map(|_| ())
    }
}

fn is_valid_record_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|ch| ch.is_ascii_hexdigit() || ch == '-')
}

fn quarantine_corrupt_record(path: &Path) -> std::io::Result<()> {
    // Keep the file for troubleshooting; remove it if the rename fails so it is not retried forever.
    fs::rename(path, path.with_extension("invalid")).or_else(|_| fs::remove_file(path))
}

fn open_private_file(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}
