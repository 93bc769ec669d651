use crate::catalog::LibraryItem;
use crate::collision::{
    apply_suffix, get_suffix, CollisionError, CollisionResolver, DEFAULT_MAX_ATTEMPTS,
};
use crate::companion::{find_companions, is_generic_companion};
use crate::template::{
    parse_template, render_template, validate_template, TemplateError, TemplatePart,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Target paths longer than this trip a preview warning.
pub const MAX_PATH_WARNING_LEN: usize = 260;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Main,
    Companion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub kind: OperationKind,
    pub item_id: String,
    pub executed: bool,
    pub error: Option<String>,
}

/// Indices into the renamer's operation arena for one item. Main first, then
/// companions in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationGroup {
    pub item_id: String,
    pub operations: Vec<usize>,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenameOptions {
    pub library_root: PathBuf,
    pub dry_run: bool,
    pub max_collision_attempts: u32,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            library_root: PathBuf::new(),
            dry_run: true,
            max_collision_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added {
        operations: usize,
        suffix: Option<String>,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Collision(#[from] CollisionError),
    #[error("item {0} is already part of this batch")]
    DuplicateItem(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub kind: OperationKind,
    pub item_id: String,
    pub source: PathBuf,
    pub target: PathBuf,
    pub source_exists: bool,
    pub target_exists: bool,
    pub would_create_dirs: bool,
    pub target_path_length: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub main_operations: usize,
    pub companion_operations: usize,
    pub items: usize,
    pub dry_run: bool,
}

/// Plans and executes the moves for a set of catalog items.
///
/// Planning ([`BatchRenamer::add`]) only reads the filesystem. Execution lives
/// in `apply.rs` and touches nothing but the filesystem; catalog updates are
/// applied afterwards from the returned result.
#[derive(Debug)]
pub struct BatchRenamer {
    pub(crate) options: RenameOptions,
    pub(crate) operations: Vec<FileOperation>,
    pub(crate) groups: Vec<OperationGroup>,
    pub(crate) rollback_log: Vec<FileOperation>,
    group_index: HashMap<String, usize>,
    claimed_sources: HashSet<PathBuf>,
    resolver: CollisionResolver,
    warnings: Vec<String>,
}

impl BatchRenamer {
    pub fn new(options: RenameOptions) -> Self {
        let resolver = CollisionResolver::new(options.max_collision_attempts);
        Self {
            options,
            operations: Vec::new(),
            groups: Vec::new(),
            rollback_log: Vec::new(),
            group_index: HashMap::new(),
            claimed_sources: HashSet::new(),
            resolver,
            warnings: Vec::new(),
        }
    }

    pub fn options(&self) -> &RenameOptions {
        &self.options
    }

    pub fn operations(&self) -> &[FileOperation] {
        &self.operations
    }

    pub fn groups(&self) -> &[OperationGroup] {
        &self.groups
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Operations moved by [`BatchRenamer::execute`], in the order they ran.
    pub fn executed_operations(&self) -> &[FileOperation] {
        &self.rollback_log
    }

    /// Schedules the move of one item and, optionally, its companion files.
    ///
    /// Missing sources and empty-resolving templates skip the item with a
    /// warning. Template and collision errors only affect this item.
    pub fn add(
        &mut self,
        item: &LibraryItem,
        folder_template: &str,
        filename_template: &str,
        include_companions: bool,
    ) -> Result<AddOutcome, PlanError> {
        let folder_parts = parse_template(folder_template)?;
        let filename_parts = parse_template(filename_template)?;

        if self.group_index.contains_key(&item.id) {
            return Err(PlanError::DuplicateItem(item.id.clone()));
        }
        if !item.path.exists() {
            return Ok(self.skip(item, "source file does not exist"));
        }

        let folder = render_template(&folder_parts, &item.metadata, None);
        let filename = render_template(&filename_parts, &item.metadata, None);
        for warning in folder.warnings.iter().chain(&filename.warnings) {
            self.warnings.push(format!("{}: {warning}", item.id));
        }
        if folder.path.is_empty() || filename.path.is_empty() {
            return Ok(self.skip(item, "template resolved to an empty path"));
        }

        let target_dir = self.options.library_root.join(relative_path(&folder.path));
        let main_target = target_dir.join(relative_path(&filename.path));
        if main_target == item.path {
            return Ok(self.skip(item, "already in place"));
        }

        let mut planned = vec![(item.path.clone(), main_target.clone(), OperationKind::Main)];
        if include_companions {
            for companion in find_companions(&item.path) {
                if self.claimed_sources.contains(&companion) {
                    self.warnings.push(format!(
                        "{}: companion {} already travels with an earlier item",
                        item.id,
                        companion.display()
                    ));
                    continue;
                }
                let target = companion_target(
                    &companion,
                    &target_dir,
                    &main_target,
                    &filename_parts,
                    item,
                );
                if planned.iter().any(|(_, planned_target, _)| *planned_target == target) {
                    self.warnings.push(format!(
                        "{}: companion {} skipped, its target clashes within the item",
                        item.id,
                        companion.display()
                    ));
                    continue;
                }
                planned.push((companion, target, OperationKind::Companion));
            }
        }

        let suffix = self.group_suffix(&planned)?;
        if apply_suffix(&main_target, suffix.as_deref()) == item.path {
            return Ok(self.skip(item, "already in place"));
        }

        let mut group_ops = Vec::with_capacity(planned.len());
        for (source, target, kind) in planned {
            let target_path = apply_suffix(&target, suffix.as_deref());
            self.claimed_sources.insert(source.clone());
            // Companion already sitting on its target; nothing to move.
            if target_path == source {
                continue;
            }
            self.resolver.reserve(&target_path);
            self.operations.push(FileOperation {
                source_path: source,
                target_path,
                kind,
                item_id: item.id.clone(),
                executed: false,
                error: None,
            });
            group_ops.push(self.operations.len() - 1);
        }

        debug!(
            item = %item.id,
            operations = group_ops.len(),
            suffix = suffix.as_deref().unwrap_or(""),
            "item scheduled"
        );
        let operations = group_ops.len();
        self.group_index.insert(item.id.clone(), self.groups.len());
        self.groups.push(OperationGroup {
            item_id: item.id.clone(),
            operations: group_ops,
            suffix: suffix.clone(),
        });

        Ok(AddOutcome::Added { operations, suffix })
    }

    /// Validates both templates once, then adds every item. A rejected template
    /// stops here; per-item errors become warnings. Returns how many items were
    /// scheduled.
    pub fn add_all(
        &mut self,
        items: &[LibraryItem],
        folder_template: &str,
        filename_template: &str,
        include_companions: bool,
    ) -> Result<usize, TemplateError> {
        validate_template(folder_template)?;
        validate_template(filename_template)?;

        let mut added = 0usize;
        for item in items {
            match self.add(item, folder_template, filename_template, include_companions) {
                Ok(AddOutcome::Added { .. }) => added += 1,
                Ok(AddOutcome::Skipped { .. }) => {}
                Err(err) => {
                    warn!(item = %item.id, error = %err, "item not scheduled");
                    self.warnings.push(format!("{}: {err}", item.id));
                }
            }
        }
        Ok(added)
    }

    pub fn preview(&self) -> Vec<PreviewEntry> {
        self.operations.iter().map(preview_operation).collect()
    }

    pub fn get_operation_summary(&self) -> OperationSummary {
        let main_operations = self
            .operations
            .iter()
            .filter(|op| op.kind == OperationKind::Main)
            .count();
        OperationSummary {
            main_operations,
            companion_operations: self.operations.len() - main_operations,
            items: self.groups.len(),
            dry_run: self.options.dry_run,
        }
    }

    fn skip(&mut self, item: &LibraryItem, reason: &str) -> AddOutcome {
        warn!(item = %item.id, path = %item.path.display(), reason, "item skipped");
        self.warnings.push(format!("{}: skipped, {reason}", item.id));
        AddOutcome::Skipped {
            reason: reason.to_string(),
        }
    }

    /// Probes the main target first (its own current path counts as free) and
    /// reuses that suffix for the companions;
    /// only if a companion is still blocked under that suffix does the whole
    /// group advance to the next common free number.
    fn group_suffix(
        &self,
        planned: &[(PathBuf, PathBuf, OperationKind)],
    ) -> Result<Option<String>, CollisionError> {
        let Some((main_source, main_target, _)) = planned.first() else {
            return Ok(None);
        };
        let resolved = self.resolver.resolve_for(main_target, Some(main_source))?;
        let suffix = get_suffix(main_target, &resolved);

        let members: Vec<(&Path, &Path)> = planned
            .iter()
            .map(|(source, target, _)| (target.as_path(), source.as_path()))
            .collect();
        let companions_free = members.iter().skip(1).all(|(target, source)| {
            let candidate = apply_suffix(target, suffix.as_deref());
            candidate == *source || !self.resolver.is_taken(&candidate)
        });
        if companions_free {
            return Ok(suffix);
        }
        self.resolver.resolve_group(&members)
    }
}

/// Same-stem companions take the rendered filename with their own `${ext}`;
/// generic ones (`cover.jpg`) keep their basename. If the filename template
/// cannot carry the companion's extension, the main stem is reused.
fn companion_target(
    companion: &Path,
    target_dir: &Path,
    main_target: &Path,
    filename_parts: &[TemplatePart],
    item: &LibraryItem,
) -> PathBuf {
    let ext = companion
        .extension()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();

    if is_generic_companion(companion) {
        if let Some(name) = companion.file_name() {
            return target_dir.join(name);
        }
    }

    let rendered = render_template(filename_parts, &item.metadata, Some(&ext));
    let expected_suffix = format!(".{}", ext.to_lowercase());
    if !rendered.path.is_empty() && rendered.path.to_lowercase().ends_with(&expected_suffix) {
        return target_dir.join(relative_path(&rendered.path));
    }

    let stem = main_target
        .file_stem()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();
    main_target.with_file_name(format!("{stem}.{ext}"))
}

fn relative_path(rendered: &str) -> PathBuf {
    rendered.split('/').collect()
}

fn preview_operation(op: &FileOperation) -> PreviewEntry {
    let source_exists = op.source_path.exists();
    let target_exists = fs::symlink_metadata(&op.target_path).is_ok();
    let would_create_dirs = op
        .target_path
        .parent()
        .map(|parent| !parent.exists())
        .unwrap_or(false);
    let target_path_length = op.target_path.to_string_lossy().chars().count();

    let mut warnings = Vec::new();
    if target_path_length > MAX_PATH_WARNING_LEN {
        warnings.push(format!(
            "target path is {target_path_length} characters long"
        ));
    }
    if target_exists {
        warnings.push("target already exists".to_string());
    }
    if !source_exists {
        warnings.push("source is missing".to_string());
    } else if fs::File::open(&op.source_path).is_err() {
        warnings.push("source is not readable".to_string());
    }

    PreviewEntry {
        kind: op.kind,
        item_id: op.item_id.clone(),
        source: op.source_path.clone(),
        target: op.target_path.clone(),
        source_exists,
        target_exists,
        would_create_dirs,
        target_path_length,
        warnings,
    }
}
