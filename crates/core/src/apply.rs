use crate::catalog::{report_relocations, Catalog, Relocation};
use crate::planner::{BatchRenamer, OperationKind};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of [`BatchRenamer::execute`]. Counts are in operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub successful: usize,
    pub failed: usize,
    pub messages: Vec<String>,
    pub relocated: Vec<Relocation>,
    pub dry_run: bool,
}

impl ExecuteResult {
    /// Reporting phase: writes each moved item's new main path to the catalog.
    pub fn apply_to_catalog(&self, catalog: &mut dyn Catalog) -> Vec<String> {
        report_relocations(catalog, &self.relocated)
    }
}

impl BatchRenamer {
    /// Moves every scheduled group, one item at a time.
    ///
    /// A group either moves completely or is put back: when one of its moves
    /// fails, the moves already done for that item are reversed in reverse order
    /// and the failure is recorded as a message. Other items still run. Groups
    /// that already moved in an earlier call are not run again.
    pub fn execute(&mut self) -> ExecuteResult {
        if self.options.dry_run {
            let planned = self.operations.len();
            info!(operations = planned, "dry run, no files moved");
            return ExecuteResult {
                successful: planned,
                dry_run: true,
                ..ExecuteResult::default()
            };
        }

        let mut result = ExecuteResult::default();
        for group_idx in 0..self.groups.len() {
            let item_id = self.groups[group_idx].item_id.clone();
            let indices = self.groups[group_idx].operations.clone();
            if indices.iter().all(|&idx| self.operations[idx].executed) {
                debug!(item = %item_id, "already executed, skipping");
                continue;
            }

            match self.execute_group(&item_id, &indices) {
                Ok(()) => {
                    result.successful += indices.len();
                    for &idx in &indices {
                        self.rollback_log.push(self.operations[idx].clone());
                    }
                    if let Some(main) = indices
                        .iter()
                        .map(|&idx| &self.operations[idx])
                        .find(|op| op.kind == OperationKind::Main)
                    {
                        result.relocated.push(Relocation {
                            item_id: item_id.clone(),
                            path: main.target_path.clone(),
                        });
                    }
                }
                Err(messages) => {
                    result.failed += indices.len();
                    result.messages.extend(messages);
                }
            }
        }

        info!(
            successful = result.successful,
            failed = result.failed,
            items = result.relocated.len(),
            "batch executed"
        );
        result
    }

    fn execute_group(&mut self, item_id: &str, indices: &[usize]) -> Result<(), Vec<String>> {
        let mut applied = Vec::<usize>::with_capacity(indices.len());
        let mut created_dirs = Vec::<PathBuf>::new();

        for &idx in indices {
            let source = self.operations[idx].source_path.clone();
            let target = self.operations[idx].target_path.clone();

            let outcome = create_parent_dirs(&target, &mut created_dirs)
                .and_then(|()| move_file(&source, &target));
            match outcome {
                Ok(()) => {
                    debug!(item = item_id, from = %source.display(), to = %target.display(), "moved");
                    self.operations[idx].executed = true;
                    applied.push(idx);
                }
                Err(err) => {
                    warn!(item = item_id, error = %format!("{err:#}"), "move failed, reverting item");
                    self.operations[idx].error = Some(format!("{err:#}"));
                    let mut messages = vec![format!("{item_id}: {err:#}")];
                    messages.extend(self.revert(item_id, &applied));
                    remove_empty_dirs(&created_dirs);
                    return Err(messages);
                }
            }
        }

        Ok(())
    }

    /// Puts already-moved operations back, newest first. Returns a message for
    /// every reversal that could not be completed.
    fn revert(&mut self, item_id: &str, applied: &[usize]) -> Vec<String> {
        let mut failures = Vec::new();
        for &idx in applied.iter().rev() {
            let op = &mut self.operations[idx];
            match move_file(&op.target_path, &op.source_path) {
                Ok(()) => op.executed = false,
                Err(err) => {
                    warn!(item = item_id, error = %format!("{err:#}"), "reversal failed");
                    failures.push(format!("{item_id}: could not revert: {err:#}"));
                }
            }
        }
        failures
    }
}

/// Moves a file without ever replacing an existing target. Falls back to copy
/// and delete when source and target are on different filesystems.
pub(crate) fn move_file(source: &Path, target: &Path) -> Result<()> {
    if fs::symlink_metadata(target).is_ok() {
        bail!("target already exists: {}", target.display());
    }

    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => copy_then_remove(source, target),
        Err(err) => Err(err).with_context(|| {
            format!("failed to move {} -> {}", source.display(), target.display())
        }),
    }
}

fn copy_then_remove(source: &Path, target: &Path) -> Result<()> {
    fs::copy(source, target).with_context(|| {
        format!("failed to copy {} -> {}", source.display(), target.display())
    })?;
    if let Err(err) = fs::remove_file(source) {
        let _ = fs::remove_file(target);
        return Err(err).with_context(|| {
            format!("failed to remove source after copy: {}", source.display())
        });
    }
    Ok(())
}

/// Creates the missing ancestors of `target` and records them deepest first.
fn create_parent_dirs(target: &Path, created: &mut Vec<PathBuf>) -> Result<()> {
    let Some(parent) = target.parent() else {
        return Ok(());
    };
    let missing: Vec<PathBuf> = parent
        .ancestors()
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        .map(Path::to_path_buf)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    created.extend(missing);
    Ok(())
}

/// Removes directories created for a reverted group, deepest first. Non-empty
/// directories stay.
fn remove_empty_dirs(created: &[PathBuf]) {
    let mut dirs = created.to_vec();
    dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
    for dir in dirs {
        let _ = fs::remove_dir(&dir);
    }
}
