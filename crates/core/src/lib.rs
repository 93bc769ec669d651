mod apply;
mod catalog;
mod collision;
mod companion;
mod config;
mod history;
mod metadata;
mod planner;
mod sanitize;
mod template;

pub const DEFAULT_FOLDER_TEMPLATE: &str = "${author.sortname}/${bookseries.title}";
pub const DEFAULT_FILENAME_TEMPLATE: &str =
    "${bookseries.title} #${bookseries.number} - ${title}.${ext}";

pub use apply::ExecuteResult;
pub use catalog::{
    report_relocations, scan_library, Catalog, CatalogFile, JsonCatalog, LibraryItem, Relocation,
    PRIMARY_EXTENSIONS,
};
pub use collision::{
    apply_suffix, get_suffix, CollisionError, CollisionResolver, DEFAULT_MAX_ATTEMPTS,
};
pub use companion::{find_companions, is_generic_companion, COMPANION_EXTENSIONS};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
};
pub use history::{
    HistoryOperation, RenameHistory, RenameHistoryEntry, RollbackFailure, RollbackReport,
};
pub use metadata::{
    reconcile_field, sortable, BookMetadata, FieldCandidate, MetadataRecord, SourceRecord,
};
pub use planner::{
    AddOutcome, BatchRenamer, FileOperation, OperationGroup, OperationKind, OperationSummary,
    PlanError, PreviewEntry, RenameOptions, MAX_PATH_WARNING_LEN,
};
pub use sanitize::{cleanup_path, normalize_path, CLEANUP_PIPELINE};
pub use template::{
    parse_template, render_template, resolve_template, validate_pattern, validate_template,
    PatternValidation, Rendered, TemplateError, TemplatePart, TOKEN_NAMES,
};
