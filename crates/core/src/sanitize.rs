use regex::Regex;
use std::sync::LazyLock;

const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

static EMPTY_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:\(\s*\)|\[\s*\])").expect("valid empty bracket regex"));
static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/{2,}").expect("valid separator regex"));
static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid space regex"));
static HASH_BEFORE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[/\s])#\s+").expect("valid hash regex"));
static HASH_AT_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+#(\.[[:alnum:]]{1,5})?(/|$)").expect("valid hash regex"));
static DASH_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\s+-)+").expect("valid dash regex"));
static LEADING_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|/)\s*-\s*").expect("valid dash regex"));
static TRAILING_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*(\.[[:alnum:]]{1,5})?(/|$)").expect("valid dash regex"));

/// A single named step of the omission cleanup.
pub type CleanupStep = (&'static str, fn(&str) -> String);

/// Cleanup applied after omitted tokens have been deleted. Order is significant:
/// spaces must be collapsed before orphaned `#`/`-` fragments are stripped, or a
/// dash preceded by a lone space survives.
pub const CLEANUP_PIPELINE: &[CleanupStep] = &[
    ("strip_empty_brackets", strip_empty_brackets),
    ("collapse_separators", collapse_separators),
    ("collapse_spaces", collapse_spaces),
    ("strip_orphan_hash", strip_orphan_hash),
    ("strip_dangling_dashes", strip_dangling_dashes),
    ("trim_edges", trim_edges),
];

pub fn cleanup_path(value: &str) -> String {
    CLEANUP_PIPELINE
        .iter()
        .fold(value.to_string(), |acc, (_, step)| step(&acc))
}

pub fn strip_empty_brackets(value: &str) -> String {
    EMPTY_BRACKETS.replace_all(value, "").into_owned()
}

pub fn collapse_separators(value: &str) -> String {
    let unified = value.replace('\\', "/");
    SEPARATOR_RUN.replace_all(&unified, "/").into_owned()
}

pub fn collapse_spaces(value: &str) -> String {
    SPACE_RUN.replace_all(value, " ").into_owned()
}

/// Drops a `#` left without its number. A bare `#` component (the catch-all
/// shelving bucket) is kept.
pub fn strip_orphan_hash(value: &str) -> String {
    let value = HASH_BEFORE_SPACE.replace_all(value, "$1");
    HASH_AT_END.replace_all(&value, "$1$2").into_owned()
}

pub fn strip_dangling_dashes(value: &str) -> String {
    let value = DASH_RUN.replace_all(value, "-");
    let value = LEADING_DASH.replace_all(&value, "$1");
    TRAILING_DASH.replace_all(&value, "$1$2").into_owned()
}

pub fn trim_edges(value: &str) -> String {
    value
        .split('/')
        .map(str::trim)
        .filter(|component| !component.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Turns a cleaned template result into a filesystem-safe relative path using
/// `/` as the only separator.
pub fn normalize_path(value: &str) -> String {
    value
        .split(['/', '\\'])
        .filter_map(normalize_component)
        .collect::<Vec<_>>()
        .join("/")
}

/// Makes a resolved token value inert: it can neither add path structure nor
/// template syntax.
pub fn sanitize_token_value(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|ch| {
            if matches!(ch, '/' | '\\' | '{' | '}') || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_component(component: &str) -> Option<String> {
    let replaced: String = component
        .chars()
        .map(|ch| if is_disallowed_char(ch) { '_' } else { ch })
        .collect();
    let mut out = replaced.trim().to_string();

    if out.is_empty() || out == "." || out == ".." {
        return None;
    }

    if is_windows_reserved(&out) {
        let stem_len = out.find('.').unwrap_or(out.len());
        out.insert(stem_len, '_');
    }

    Some(out)
}

fn is_disallowed_char(ch: char) -> bool {
    matches!(ch, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '&' | '\\') || ch.is_control()
}

fn is_windows_reserved(value: &str) -> bool {
    let stem = value
        .split('.')
        .next()
        .unwrap_or(value)
        .to_ascii_uppercase();
    WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| reserved == &stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_order_is_stable() {
        let names: Vec<&str> = CLEANUP_PIPELINE.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                "strip_empty_brackets",
                "collapse_separators",
                "collapse_spaces",
                "strip_orphan_hash",
                "strip_dangling_dashes",
                "trim_edges",
            ]
        );
    }

    #[test]
    fn empty_brackets_are_removed() {
        assert_eq!(strip_empty_brackets("Foundation ( )"), "Foundation");
        assert_eq!(strip_empty_brackets("Foundation [].epub"), "Foundation.epub");
        assert_eq!(strip_empty_brackets("Foundation (1951)"), "Foundation (1951)");
    }

    #[test]
    fn separators_collapse_and_unify() {
        assert_eq!(collapse_separators("a//b\\\\c"), "a/b/c");
    }

    #[test]
    fn spaces_collapse() {
        assert_eq!(collapse_spaces("a   b  c"), "a b c");
    }

    #[test]
    fn orphan_hash_is_stripped() {
        assert_eq!(strip_orphan_hash(" # - Foundation"), " - Foundation");
        assert_eq!(strip_orphan_hash("Dune # - Foundation"), "Dune - Foundation");
        assert_eq!(strip_orphan_hash("Dune #"), "Dune");
        assert_eq!(strip_orphan_hash("Dune #.epub"), "Dune.epub");
    }

    #[test]
    fn catch_all_bucket_hash_is_kept() {
        assert_eq!(strip_orphan_hash("#/1984"), "#/1984");
        assert_eq!(strip_orphan_hash("Orwell/#"), "Orwell/#");
        assert_eq!(strip_orphan_hash("C# in Depth"), "C# in Depth");
    }

    #[test]
    fn dangling_dashes_are_stripped() {
        assert_eq!(strip_dangling_dashes(" - Foundation"), "Foundation");
        assert_eq!(strip_dangling_dashes("Dune - "), "Dune");
        assert_eq!(strip_dangling_dashes("Dune - .epub"), "Dune.epub");
        assert_eq!(strip_dangling_dashes("Dune - - Foundation"), "Dune - Foundation");
        assert_eq!(strip_dangling_dashes("Author/ - Title"), "Author/Title");
        assert_eq!(strip_dangling_dashes("Spider-Man"), "Spider-Man");
    }

    #[test]
    fn trim_edges_drops_empty_components() {
        assert_eq!(trim_edges("/ a / /b/ "), "a/b");
    }

    #[test]
    fn dash_after_lone_space_needs_space_collapse_first() {
        assert_eq!(cleanup_path("  #  - Foundation.epub"), "Foundation.epub");
    }

    #[test]
    fn cleanup_removes_series_leftovers() {
        assert_eq!(cleanup_path(" # - Foundation.epub"), "Foundation.epub");
        assert_eq!(cleanup_path("Asimov//Foundation"), "Asimov/Foundation");
    }

    #[test]
    fn normalize_replaces_unsafe_characters_per_component() {
        assert_eq!(
            normalize_path("Q&A: Part 1/What? \"Yes\" <no>|*"),
            "Q_A_ Part 1/What_ _Yes_ _no___"
        );
    }

    #[test]
    fn normalize_drops_traversal_and_empty_components() {
        assert_eq!(normalize_path("../a/./ b /"), "a/b");
        assert_eq!(normalize_path("a\\b"), "a/b");
    }

    #[test]
    fn normalize_suffixes_reserved_names() {
        assert_eq!(normalize_path("CON/aux.txt"), "CON_/aux_.txt");
    }

    #[test]
    fn token_values_cannot_add_structure() {
        assert_eq!(sanitize_token_value("AC/DC ${x}"), "AC_DC $_x_");
        assert_eq!(sanitize_token_value("  spaced   out "), "spaced out");
    }
}
