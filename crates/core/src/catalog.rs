use crate::metadata::{BookMetadata, SourceRecord};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Extensions treated as primary media files when scanning a library.
pub const PRIMARY_EXTENSIONS: &[&str] = &[
    "epub", "pdf", "mobi", "azw3", "cbz", "cbr", "m4b", "mp3",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: String,
    pub path: PathBuf,
    #[serde(default)]
    pub metadata: BookMetadata,
    /// Per-source opinions; blank `metadata` fields are reconciled from these on load.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRecord>,
}

/// New location of an item's primary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    pub item_id: String,
    pub path: PathBuf,
}

/// The external catalog as seen by the renamer: a read accessor and a single
/// writable field, the item's path.
pub trait Catalog {
    fn item(&self, id: &str) -> Option<LibraryItem>;
    fn update_path(&mut self, id: &str, new_path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    pub items: Vec<LibraryItem>,
}

impl Catalog for CatalogFile {
    fn item(&self, id: &str) -> Option<LibraryItem> {
        self.items.iter().find(|item| item.id == id).cloned()
    }

    fn update_path(&mut self, id: &str, new_path: &Path) -> Result<()> {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            bail!("unknown catalog item: {id}");
        };
        item.path = new_path.to_path_buf();
        Ok(())
    }
}

/// A catalog kept in a JSON file; changes stay in memory until [`JsonCatalog::save`].
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    path: PathBuf,
    data: CatalogFile,
}

impl JsonCatalog {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog: {}", path.display()))?;
        let mut data = serde_json::from_str::<CatalogFile>(&raw)
            .with_context(|| format!("failed to parse catalog: {}", path.display()))?;
        for item in &mut data.items {
            let sources = std::mem::take(&mut item.sources);
            item.metadata.fill_from_sources(&sources);
            item.sources = sources;
        }
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn with_items(path: &Path, items: Vec<LibraryItem>) -> Self {
        Self {
            path: path.to_path_buf(),
            data: CatalogFile { items },
        }
    }

    pub fn items(&self) -> &[LibraryItem] {
        &self.data.items
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create catalog directory: {}", parent.display())
            })?;
        }
        let body =
            serde_json::to_string_pretty(&self.data).context("failed to serialize catalog")?;
        fs::write(&self.path, body)
            .with_context(|| format!("failed to write catalog: {}", self.path.display()))?;
        Ok(())
    }
}

impl Catalog for JsonCatalog {
    fn item(&self, id: &str) -> Option<LibraryItem> {
        self.data.item(id)
    }

    fn update_path(&mut self, id: &str, new_path: &Path) -> Result<()> {
        self.data.update_path(id, new_path)
    }
}

/// Writes each relocated item's new primary path back to the catalog.
/// Returns one message per item that could not be updated.
pub fn report_relocations(catalog: &mut dyn Catalog, relocations: &[Relocation]) -> Vec<String> {
    let mut errors = Vec::new();
    for relocation in relocations {
        match catalog.update_path(&relocation.item_id, &relocation.path) {
            Ok(()) => debug!(
                item = %relocation.item_id,
                path = %relocation.path.display(),
                "catalog path updated"
            ),
            Err(err) => {
                warn!(item = %relocation.item_id, error = %err, "catalog update failed");
                errors.push(format!("{}: {err:#}", relocation.item_id));
            }
        }
    }
    errors
}

/// Builds skeleton catalog entries for every primary media file under `root`.
/// Hidden files and directories are skipped; ids are paths relative to `root`.
pub fn scan_library(root: &Path) -> Result<Vec<LibraryItem>> {
    if !root.is_dir() {
        bail!("library folder does not exist: {}", root.display());
    }

    let mut items = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk: {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().map(|v| v.to_string_lossy().to_string()) else {
            continue;
        };
        if !PRIMARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            continue;
        }

        let id = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let metadata = BookMetadata {
            title: path.file_stem().map(|v| v.to_string_lossy().to_string()),
            extension: Some(ext),
            original_filename: path.file_name().map(|v| v.to_string_lossy().to_string()),
            ..BookMetadata::default()
        };
        items.push(LibraryItem {
            id,
            path: path.to_path_buf(),
            metadata,
            sources: Vec::new(),
        });
    }

    Ok(items)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn item(id: &str, path: &str) -> LibraryItem {
        LibraryItem {
            id: id.to_string(),
            path: PathBuf::from(path),
            metadata: BookMetadata::default(),
            sources: Vec::new(),
        }
    }

    #[test]
    fn report_updates_known_items_and_collects_errors() {
        let mut catalog = CatalogFile {
            items: vec![item("1", "/old/a.epub")],
        };
        let relocations = vec![
            Relocation {
                item_id: "1".to_string(),
                path: PathBuf::from("/new/a.epub"),
            },
            Relocation {
                item_id: "missing".to_string(),
                path: PathBuf::from("/new/b.epub"),
            },
        ];

        let errors = report_relocations(&mut catalog, &relocations);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("missing"));
        assert_eq!(
            catalog.item("1").map(|i| i.path),
            Some(PathBuf::from("/new/a.epub"))
        );
    }

    #[test]
    fn json_catalog_persists_path_updates() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("catalog.json");
        let mut catalog = JsonCatalog::with_items(&file, vec![item("1", "/old/a.epub")]);
        catalog
            .update_path("1", Path::new("/new/a.epub"))
            .expect("update");
        catalog.save().expect("save");

        let reopened = JsonCatalog::open(&file).expect("reopen");
        assert_eq!(reopened.items()[0].path, PathBuf::from("/new/a.epub"));
    }

    #[test]
    fn json_catalog_tolerates_missing_metadata() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("catalog.json");
        fs::write(&file, r#"{"items":[{"id":"7","path":"/x/y.epub"}]}"#).expect("write");
        let catalog = JsonCatalog::open(&file).expect("open");
        assert_eq!(catalog.items()[0].metadata, BookMetadata::default());
    }

    #[test]
    fn open_reconciles_sources_into_blank_fields() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("catalog.json");
        fs::write(
            &file,
            r#"{"items":[{
                "id":"7",
                "path":"/x/y.epub",
                "metadata":{"author":"Isaac Asimov"},
                "sources":[
                    {"source":"embedded","confidence":0.5,"metadata":{"title":"foundation"}},
                    {"source":"sidecar","confidence":0.8,"metadata":{"title":"Foundation"}},
                    {"source":"manual","confidence":1.0,"active":false,"metadata":{"title":"Nope"}}
                ]
            }]}"#,
        )
        .expect("write");

        let catalog = JsonCatalog::open(&file).expect("open");
        let item = &catalog.items()[0];
        assert_eq!(item.metadata.title.as_deref(), Some("Foundation"));
        assert_eq!(item.metadata.author.as_deref(), Some("Isaac Asimov"));
        assert_eq!(item.sources.len(), 3);
    }

    #[test]
    fn scan_finds_primary_files_and_skips_hidden() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("nested")).expect("nested");
        fs::create_dir_all(root.join(".trash")).expect("hidden dir");
        fs::write(root.join("Foundation.epub"), b"x").expect("write");
        fs::write(root.join("Foundation.jpg"), b"x").expect("write");
        fs::write(root.join("nested").join("Dune.PDF"), b"x").expect("write");
        fs::write(root.join(".trash").join("Old.epub"), b"x").expect("write");
        fs::write(root.join(".hidden.epub"), b"x").expect("write");

        let items = scan_library(root).expect("scan");
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["Foundation.epub", "nested/Dune.PDF"]);
        assert_eq!(items[1].metadata.title.as_deref(), Some("Dune"));
        assert_eq!(items[1].metadata.extension.as_deref(), Some("PDF"));
    }

    #[test]
    fn scan_rejects_missing_root() {
        let temp = tempdir().expect("tempdir");
        assert!(scan_library(&temp.path().join("nope")).is_err());
    }
}
