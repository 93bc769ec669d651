use crate::apply::move_file;
use crate::catalog::Relocation;
use crate::config::app_paths;
use crate::planner::{FileOperation, OperationKind};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryOperation {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub kind: OperationKind,
    pub item_id: String,
}

impl From<&FileOperation> for HistoryOperation {
    fn from(op: &FileOperation) -> Self {
        Self {
            source_path: op.source_path.clone(),
            target_path: op.target_path.clone(),
            kind: op.kind,
            item_id: op.item_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameHistoryEntry {
    pub batch_id: String,
    pub operations: Vec<HistoryOperation>,
    pub timestamp: DateTime<Local>,
    pub actor: String,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    entries: Vec<RenameHistoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackFailure {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub success: bool,
    pub message: String,
    pub restored: usize,
    pub already_restored: usize,
    pub failures: Vec<RollbackFailure>,
    /// Main files put back at their source, for writing back to the catalog.
    pub relocated: Vec<Relocation>,
}

/// Executed batches, persisted as JSON so a run can be reversed later.
#[derive(Debug, Clone)]
pub struct RenameHistory {
    path: PathBuf,
}

impl RenameHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(app_paths()?.history_path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first.
    pub fn list(&self) -> Result<Vec<RenameHistoryEntry>> {
        Ok(self.load()?.entries)
    }

    /// Newest entry that has not been rolled back yet.
    pub fn latest(&self) -> Result<Option<RenameHistoryEntry>> {
        Ok(self
            .load()?
            .entries
            .into_iter()
            .rev()
            .find(|entry| entry.rolled_back_at.is_none()))
    }

    /// Records `operations` in execution order and returns the new batch id.
    pub fn save_operation_batch(&self, operations: &[FileOperation], actor: &str) -> Result<String> {
        if operations.is_empty() {
            bail!("refusing to record an empty batch");
        }

        let mut file = self.load()?;
        let timestamp = Local::now();
        let base_id = timestamp.format("%Y%m%d%H%M%S%3f").to_string();
        let mut batch_id = base_id.clone();
        let mut n = 1usize;
        while file.entries.iter().any(|entry| entry.batch_id == batch_id) {
            n += 1;
            batch_id = format!("{base_id}-{n}");
        }

        file.entries.push(RenameHistoryEntry {
            batch_id: batch_id.clone(),
            operations: operations.iter().map(HistoryOperation::from).collect(),
            timestamp,
            actor: actor.to_string(),
            rolled_back_at: None,
        });
        self.store(&file)?;

        info!(batch = %batch_id, operations = operations.len(), "batch recorded");
        Ok(batch_id)
    }

    /// Moves every target of the batch back to its source, newest operation
    /// first. Failures are collected per operation and never stop the rest.
    pub fn rollback_batch(&self, batch_id: &str) -> Result<RollbackReport> {
        let mut file = self.load()?;
        let Some(entry) = file
            .entries
            .iter_mut()
            .find(|entry| entry.batch_id == batch_id)
        else {
            return Ok(RollbackReport {
                message: format!("no batch with id {batch_id}"),
                ..RollbackReport::default()
            });
        };
        if let Some(at) = entry.rolled_back_at {
            return Ok(RollbackReport {
                message: format!("batch {batch_id} was already rolled back at {at}"),
                ..RollbackReport::default()
            });
        }

        let mut report = RollbackReport::default();
        for op in entry.operations.iter().rev() {
            match reverse_operation(op) {
                Ok(Reversal::Restored) => {
                    report.restored += 1;
                    if op.kind == OperationKind::Main {
                        report.relocated.push(Relocation {
                            item_id: op.item_id.clone(),
                            path: op.source_path.clone(),
                        });
                    }
                }
                Ok(Reversal::AlreadyRestored) => report.already_restored += 1,
                Err(err) => {
                    warn!(
                        batch = batch_id,
                        target = %op.target_path.display(),
                        error = %format!("{err:#}"),
                        "reversal failed"
                    );
                    report.failures.push(RollbackFailure {
                        source_path: op.source_path.clone(),
                        target_path: op.target_path.clone(),
                        reason: format!("{err:#}"),
                    });
                }
            }
        }

        report.success = report.failures.is_empty();
        if report.success {
            entry.rolled_back_at = Some(Local::now());
            report.message = format!(
                "batch {batch_id} rolled back: {} restored, {} already in place",
                report.restored, report.already_restored
            );
        } else {
            report.message = format!(
                "batch {batch_id} partially rolled back: {} restored, {} failed",
                report.restored,
                report.failures.len()
            );
        }
        self.store(&file)?;

        info!(batch = batch_id, success = report.success, "rollback finished");
        Ok(report)
    }

    fn load(&self) -> Result<HistoryFile> {
        if !self.path.exists() {
            return Ok(HistoryFile::default());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read history: {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse history: {}", self.path.display()))
    }

    fn store(&self, file: &HistoryFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory: {}", parent.display())
            })?;
        }
        let body = serde_json::to_string_pretty(file).context("failed to serialize history")?;
        fs::write(&self.path, body)
            .with_context(|| format!("failed to write history: {}", self.path.display()))?;
        Ok(())
    }
}

enum Reversal {
    Restored,
    AlreadyRestored,
}

fn reverse_operation(op: &HistoryOperation) -> Result<Reversal> {
    let target_present = fs::symlink_metadata(&op.target_path).is_ok();
    let source_present = fs::symlink_metadata(&op.source_path).is_ok();

    match (target_present, source_present) {
        (false, true) => Ok(Reversal::AlreadyRestored),
        (false, false) => bail!("file is gone: {}", op.target_path.display()),
        (true, true) => bail!("source is occupied: {}", op.source_path.display()),
        (true, false) => {
            if let Some(parent) = op.source_path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to recreate directory: {}", parent.display())
                })?;
            }
            move_file(&op.target_path, &op.source_path)?;
            Ok(Reversal::Restored)
        }
    }
}
