use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const COMPANION_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "opf", "xml", "txt", "nfo", "srt", "vtt",
];
pub const GENERIC_BASENAMES: &[&str] = &["cover", "metadata", "description"];

/// Sibling files that travel with `primary`: same-stem files and generic
/// `cover`/`metadata`/`description` files with an allowed extension.
///
/// Only reads the directory listing. The result is sorted and deduplicated.
pub fn find_companions(primary: &Path) -> Vec<PathBuf> {
    let Some(parent) = primary.parent() else {
        return Vec::new();
    };
    let Some(primary_stem) = primary.file_stem().map(|v| v.to_string_lossy().to_string()) else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(parent) else {
        return Vec::new();
    };

    let mut found = BTreeSet::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path == primary || !path.is_file() {
            continue;
        }
        if is_companion_of(&primary_stem, &path) {
            found.insert(path);
        }
    }
    found.into_iter().collect()
}

/// True for generic companions such as `cover.jpg`, which keep their own
/// basename instead of taking the primary file's rendered name.
pub fn is_generic_companion(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| {
            let stem = stem.to_string_lossy();
            GENERIC_BASENAMES
                .iter()
                .any(|generic| stem.eq_ignore_ascii_case(generic))
        })
        .unwrap_or(false)
}

fn is_companion_of(primary_stem: &str, candidate: &Path) -> bool {
    let Some(ext) = candidate.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_ascii_lowercase();
    if !COMPANION_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }

    let same_stem = candidate
        .file_stem()
        .map(|stem| stem.to_string_lossy() == primary_stem)
        .unwrap_or(false);
    same_stem || is_generic_companion(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"x").expect("write fixture");
        path
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect()
    }

    #[test]
    fn finds_same_stem_and_generic_companions() {
        let temp = tempdir().expect("tempdir");
        let primary = touch(temp.path(), "Foundation.epub");
        touch(temp.path(), "Foundation.jpg");
        touch(temp.path(), "Foundation.opf");
        touch(temp.path(), "cover.jpg");
        touch(temp.path(), "other_book.epub");

        let companions = find_companions(&primary);
        assert_eq!(
            names(&companions),
            vec!["Foundation.jpg", "Foundation.opf", "cover.jpg"]
        );
    }

    #[test]
    fn stem_match_is_exact() {
        let temp = tempdir().expect("tempdir");
        let primary = touch(temp.path(), "Foundation.epub");
        touch(temp.path(), "Foundation and Empire.jpg");
        touch(temp.path(), "foundation.jpg");
        touch(temp.path(), "Foundation.pdf");

        assert!(find_companions(&primary).is_empty());
    }

    #[test]
    fn uppercase_extensions_are_accepted() {
        let temp = tempdir().expect("tempdir");
        let primary = touch(temp.path(), "Foundation.epub");
        touch(temp.path(), "Foundation.JPG");
        touch(temp.path(), "Cover.PNG");

        assert_eq!(
            names(&find_companions(&primary)),
            vec!["Cover.PNG", "Foundation.JPG"]
        );
    }

    #[test]
    fn directories_are_ignored() {
        let temp = tempdir().expect("tempdir");
        let primary = touch(temp.path(), "Foundation.epub");
        fs::create_dir(temp.path().join("cover.jpg")).expect("create dir");

        assert!(find_companions(&primary).is_empty());
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let temp = tempdir().expect("tempdir");
        let primary = temp.path().join("gone").join("Foundation.epub");
        assert!(find_companions(&primary).is_empty());
    }

    #[test]
    fn generic_companion_detection() {
        assert!(is_generic_companion(Path::new("/a/cover.jpg")));
        assert!(is_generic_companion(Path::new("/a/Metadata.opf")));
        assert!(!is_generic_companion(Path::new("/a/Foundation.jpg")));
    }
}
