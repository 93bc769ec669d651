use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 999;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollisionError {
    #[error("no free name for {} after {attempts} attempts", path.display())]
    Exhausted { path: PathBuf, attempts: u32 },
}

/// Finds free target names using a `" (N)"` suffix between stem and extension.
///
/// Paths handed to [`CollisionResolver::reserve`] count as taken even before
/// anything exists on disk, so targets scheduled earlier in the same batch are
/// never handed out twice.
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    max_attempts: u32,
    reserved: HashSet<PathBuf>,
}

impl Default for CollisionResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl CollisionResolver {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            reserved: HashSet::new(),
        }
    }

    pub fn reserve(&mut self, path: &Path) {
        self.reserved.insert(path.to_path_buf());
    }

    pub fn is_taken(&self, path: &Path) -> bool {
        // symlink_metadata so that dangling links still count as occupied
        self.reserved.contains(path) || fs::symlink_metadata(path).is_ok()
    }

    /// Returns `target` unchanged when it is free, otherwise the first free
    /// numbered variant starting at `" (2)"`.
    pub fn resolve(&self, target: &Path) -> Result<PathBuf, CollisionError> {
        self.resolve_for(target, None)
    }

    /// Like [`CollisionResolver::resolve`], but `own_source` (the file being
    /// moved) counts as free, so a file already sitting on a candidate keeps it.
    pub fn resolve_for(
        &self,
        target: &Path,
        own_source: Option<&Path>,
    ) -> Result<PathBuf, CollisionError> {
        let is_free =
            |candidate: &Path| Some(candidate) == own_source || !self.is_taken(candidate);
        if is_free(target) {
            return Ok(target.to_path_buf());
        }
        for n in 2..self.max_attempts.saturating_add(2) {
            let candidate = apply_suffix(target, Some(&suffix_for(n)));
            if is_free(candidate.as_path()) {
                return Ok(candidate);
            }
        }
        Err(CollisionError::Exhausted {
            path: target.to_path_buf(),
            attempts: self.max_attempts,
        })
    }

    /// Picks one suffix for a whole group of `(target, source)` pairs: the
    /// smallest one under which every target is free. A target equal to its own
    /// source counts as free.
    pub fn resolve_group(
        &self,
        members: &[(&Path, &Path)],
    ) -> Result<Option<String>, CollisionError> {
        let Some((first, _)) = members.first() else {
            return Ok(None);
        };

        if self.group_is_free(members, None) {
            return Ok(None);
        }
        for n in 2..self.max_attempts.saturating_add(2) {
            let suffix = suffix_for(n);
            if self.group_is_free(members, Some(&suffix)) {
                return Ok(Some(suffix));
            }
        }
        Err(CollisionError::Exhausted {
            path: first.to_path_buf(),
            attempts: self.max_attempts,
        })
    }

    fn group_is_free(&self, members: &[(&Path, &Path)], suffix: Option<&str>) -> bool {
        members.iter().all(|(target, source)| {
            let candidate = apply_suffix(target, suffix);
            candidate == *source || !self.is_taken(&candidate)
        })
    }
}

pub fn suffix_for(n: u32) -> String {
    format!(" ({n})")
}

/// Inserts `suffix` between stem and extension; `None` leaves the path as is.
pub fn apply_suffix(path: &Path, suffix: Option<&str>) -> PathBuf {
    let Some(suffix) = suffix else {
        return path.to_path_buf();
    };
    let stem = path
        .file_stem()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut name = format!("{stem}{suffix}");
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}

/// Recovers the suffix [`CollisionResolver::resolve`] added to `original`.
pub fn get_suffix(original: &Path, resolved: &Path) -> Option<String> {
    let original_stem = original.file_stem()?.to_string_lossy().to_string();
    let resolved_stem = resolved.file_stem()?.to_string_lossy().to_string();
    let suffix = resolved_stem.strip_prefix(&original_stem)?;
    (!suffix.is_empty()).then(|| suffix.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn free_path_is_returned_unchanged() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("Foundation.epub");
        let resolved = CollisionResolver::default()
            .resolve(&target)
            .expect("free path resolves");
        assert_eq!(resolved, target);
    }

    #[test]
    fn existing_path_gets_second_slot() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("Foundation.epub");
        fs::write(&target, b"x").expect("write existing");
        let resolved = CollisionResolver::default()
            .resolve(&target)
            .expect("collision resolves");
        assert_eq!(resolved, temp.path().join("Foundation (2).epub"));
    }

    #[test]
    fn numbered_variants_are_skipped_to_first_free_slot() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("Foundation.epub");
        fs::write(&target, b"x").expect("write base");
        for n in 2..=4 {
            fs::write(temp.path().join(format!("Foundation ({n}).epub")), b"x")
                .expect("write variant");
        }
        let resolved = CollisionResolver::default()
            .resolve(&target)
            .expect("collision resolves");
        assert_eq!(resolved, temp.path().join("Foundation (5).epub"));
    }

    #[test]
    fn reserved_paths_count_as_taken() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("Foundation.epub");
        let mut resolver = CollisionResolver::default();
        resolver.reserve(&target);
        let resolved = resolver.resolve(&target).expect("collision resolves");
        assert_eq!(resolved, temp.path().join("Foundation (2).epub"));
    }

    #[test]
    fn own_source_counts_as_free() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("Foundation.epub");
        let own = temp.path().join("Foundation (2).epub");
        fs::write(&target, b"other").expect("write base");
        fs::write(&own, b"self").expect("write own");

        let resolver = CollisionResolver::default();
        assert_eq!(
            resolver.resolve_for(&target, Some(&own)).expect("resolves"),
            own
        );
        assert_eq!(
            resolver.resolve(&target).expect("resolves"),
            temp.path().join("Foundation (3).epub")
        );
    }

    #[test]
    fn exhausting_attempts_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("Foundation.epub");
        fs::write(&target, b"x").expect("write base");
        fs::write(temp.path().join("Foundation (2).epub"), b"x").expect("write variant");
        fs::write(temp.path().join("Foundation (3).epub"), b"x").expect("write variant");

        let err = CollisionResolver::new(2)
            .resolve(&target)
            .expect_err("must exhaust");
        assert_eq!(
            err,
            CollisionError::Exhausted {
                path: target,
                attempts: 2
            }
        );
    }

    #[test]
    fn suffix_round_trips_through_apply() {
        let temp = tempdir().expect("tempdir");
        let original = temp.path().join("Foundation.epub");
        fs::write(&original, b"x").expect("write base");
        let resolved = CollisionResolver::default()
            .resolve(&original)
            .expect("collision resolves");

        let suffix = get_suffix(&original, &resolved);
        assert_eq!(suffix.as_deref(), Some(" (2)"));
        assert_eq!(apply_suffix(&original, suffix.as_deref()), resolved);
    }

    #[test]
    fn no_suffix_when_unchanged() {
        let path = Path::new("/library/Foundation.epub");
        assert_eq!(get_suffix(path, path), None);
        assert_eq!(apply_suffix(path, None), path);
    }

    #[test]
    fn suffix_applies_to_extensionless_paths() {
        let path = Path::new("/library/README");
        assert_eq!(
            apply_suffix(path, Some(" (3)")),
            PathBuf::from("/library/README (3)")
        );
    }

    #[test]
    fn group_suffix_advances_when_any_member_collides() {
        let temp = tempdir().expect("tempdir");
        let main = temp.path().join("Foundation.epub");
        let cover = temp.path().join("Foundation.jpg");
        let source_main = temp.path().join("in").join("a.epub");
        let source_cover = temp.path().join("in").join("a.jpg");
        fs::write(&cover, b"x").expect("write cover");
        fs::write(temp.path().join("Foundation (2).jpg"), b"x").expect("write cover 2");

        let suffix = CollisionResolver::default()
            .resolve_group(&[(&main, &source_main), (&cover, &source_cover)])
            .expect("group resolves");
        assert_eq!(suffix.as_deref(), Some(" (3)"));
    }

    #[test]
    fn group_without_collisions_has_no_suffix() {
        let temp = tempdir().expect("tempdir");
        let main = temp.path().join("Foundation.epub");
        let source = temp.path().join("a.epub");
        let suffix = CollisionResolver::default()
            .resolve_group(&[(&main, &source)])
            .expect("group resolves");
        assert_eq!(suffix, None);
    }
}
