use serde::{Deserialize, Serialize};

const LEADING_ARTICLES: &[&str] = &["The ", "A ", "An "];

/// Read-only view of an item's descriptive fields, as supplied by the catalog.
///
/// Every accessor returns `None` for absent or blank values. Template tokens are
/// resolved exclusively through this trait.
pub trait MetadataRecord {
    fn title(&self) -> Option<&str>;
    fn title_sort(&self) -> Option<String>;
    fn author_full(&self) -> Option<&str>;
    fn author_sort(&self) -> Option<String>;
    fn author_first(&self) -> Option<String>;
    fn author_last(&self) -> Option<String>;
    fn series(&self) -> Option<&str>;
    fn series_number(&self) -> Option<&str>;
    fn series_sort(&self) -> Option<String>;
    fn language(&self) -> Option<&str>;
    fn category(&self) -> Option<&str>;
    fn genre(&self) -> Option<&str>;
    fn publication_year(&self) -> Option<i32>;
    fn format(&self) -> Option<&str>;
    fn extension(&self) -> Option<&str>;
    fn original_filename(&self) -> Option<&str>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub title_sort: Option<String>,
    pub author: Option<String>,
    pub author_sort: Option<String>,
    pub author_first: Option<String>,
    pub author_last: Option<String>,
    pub series: Option<String>,
    pub series_number: Option<String>,
    pub series_sort: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub genre: Option<String>,
    pub publication_year: Option<i32>,
    pub format: Option<String>,
    pub extension: Option<String>,
    pub original_filename: Option<String>,
}

impl MetadataRecord for BookMetadata {
    fn title(&self) -> Option<&str> {
        non_blank(&self.title)
    }

    fn title_sort(&self) -> Option<String> {
        non_blank(&self.title_sort)
            .map(str::to_string)
            .or_else(|| self.title().map(sortable))
    }

    fn author_full(&self) -> Option<&str> {
        non_blank(&self.author)
    }

    fn author_sort(&self) -> Option<String> {
        if let Some(sort) = non_blank(&self.author_sort) {
            return Some(sort.to_string());
        }
        match (self.author_last(), self.author_first()) {
            (Some(last), Some(first)) => Some(format!("{last}, {first}")),
            (Some(last), None) => Some(last),
            (None, _) => None,
        }
    }

    fn author_first(&self) -> Option<String> {
        if let Some(first) = non_blank(&self.author_first) {
            return Some(first.to_string());
        }
        let (first, _) = split_name(self.author_full()?);
        first
    }

    fn author_last(&self) -> Option<String> {
        if let Some(last) = non_blank(&self.author_last) {
            return Some(last.to_string());
        }
        let (_, last) = split_name(self.author_full()?);
        last
    }

    fn series(&self) -> Option<&str> {
        non_blank(&self.series)
    }

    fn series_number(&self) -> Option<&str> {
        non_blank(&self.series_number)
    }

    fn series_sort(&self) -> Option<String> {
        non_blank(&self.series_sort)
            .map(str::to_string)
            .or_else(|| self.series().map(sortable))
    }

    fn language(&self) -> Option<&str> {
        non_blank(&self.language)
    }

    fn category(&self) -> Option<&str> {
        non_blank(&self.category)
    }

    fn genre(&self) -> Option<&str> {
        non_blank(&self.genre)
    }

    fn publication_year(&self) -> Option<i32> {
        self.publication_year
    }

    fn format(&self) -> Option<&str> {
        non_blank(&self.format)
    }

    fn extension(&self) -> Option<&str> {
        non_blank(&self.extension).map(|ext| ext.trim_start_matches('.'))
    }

    fn original_filename(&self) -> Option<&str> {
        non_blank(&self.original_filename)
    }
}

/// Moves a leading English article to the end: `"The Hobbit"` becomes `"Hobbit, The"`.
pub fn sortable(value: &str) -> String {
    let value = value.trim();
    for article in LEADING_ARTICLES {
        let Some(head) = value.get(..article.len()) else {
            continue;
        };
        if head.eq_ignore_ascii_case(article) {
            let rest = value[article.len()..].trim_start();
            if rest.is_empty() {
                break;
            }
            return format!("{}, {}", rest, head.trim_end());
        }
    }
    value.to_string()
}

/// One catalog source's opinion about a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidate {
    pub source: String,
    pub value: String,
    pub confidence: f32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Picks the value the catalog should expose for a field.
///
/// Highest confidence among active sources wins; ties go to the candidate that
/// appears first. Inactive sources and blank values never win.
pub fn reconcile_field(candidates: &[FieldCandidate]) -> Option<String> {
    let mut best: Option<&FieldCandidate> = None;
    for candidate in candidates {
        if !candidate.active || candidate.value.trim().is_empty() {
            continue;
        }
        match best {
            Some(current) if candidate.confidence <= current.confidence => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|c| c.value.trim().to_string())
}

/// Metadata as reported by one source (embedded tags, an OPF sidecar, a manual
/// edit), with the confidence the catalog assigns to that source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: String,
    pub confidence: f32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub metadata: BookMetadata,
}

impl BookMetadata {
    /// Fills every field that is still blank with the value reconciled across
    /// `sources`. Fields already set on the item are kept.
    pub fn fill_from_sources(&mut self, sources: &[SourceRecord]) {
        if sources.is_empty() {
            return;
        }
        fill_field(&mut self.title, sources, |m| m.title.as_ref());
        fill_field(&mut self.title_sort, sources, |m| m.title_sort.as_ref());
        fill_field(&mut self.author, sources, |m| m.author.as_ref());
        fill_field(&mut self.author_sort, sources, |m| m.author_sort.as_ref());
        fill_field(&mut self.author_first, sources, |m| m.author_first.as_ref());
        fill_field(&mut self.author_last, sources, |m| m.author_last.as_ref());
        fill_field(&mut self.series, sources, |m| m.series.as_ref());
        fill_field(&mut self.series_number, sources, |m| m.series_number.as_ref());
        fill_field(&mut self.series_sort, sources, |m| m.series_sort.as_ref());
        fill_field(&mut self.language, sources, |m| m.language.as_ref());
        fill_field(&mut self.category, sources, |m| m.category.as_ref());
        fill_field(&mut self.genre, sources, |m| m.genre.as_ref());
        fill_field(&mut self.format, sources, |m| m.format.as_ref());
        fill_field(&mut self.extension, sources, |m| m.extension.as_ref());
        fill_field(&mut self.original_filename, sources, |m| {
            m.original_filename.as_ref()
        });

        if self.publication_year.is_none() {
            let candidates: Vec<FieldCandidate> = sources
                .iter()
                .filter_map(|src| {
                    src.metadata
                        .publication_year
                        .map(|year| candidate_from(src, year.to_string()))
                })
                .collect();
            self.publication_year = reconcile_field(&candidates).and_then(|y| y.parse().ok());
        }
    }
}

fn fill_field<F>(slot: &mut Option<String>, sources: &[SourceRecord], get: F)
where
    F: Fn(&BookMetadata) -> Option<&String>,
{
    if non_blank(slot).is_some() {
        return;
    }
    let candidates: Vec<FieldCandidate> = sources
        .iter()
        .filter_map(|src| get(&src.metadata).map(|value| candidate_from(src, value.clone())))
        .collect();
    if let Some(value) = reconcile_field(&candidates) {
        *slot = Some(value);
    }
}

fn candidate_from(src: &SourceRecord, value: String) -> FieldCandidate {
    FieldCandidate {
        source: src.source.clone(),
        value,
        confidence: src.confidence,
        active: src.active,
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn split_name(full: &str) -> (Option<String>, Option<String>) {
    if let Some((last, first)) = full.split_once(',') {
        let first = first.trim();
        let last = last.trim();
        return (
            (!first.is_empty()).then(|| first.to_string()),
            (!last.is_empty()).then(|| last.to_string()),
        );
    }

    let mut words: Vec<&str> = full.split_whitespace().collect();
    let last = words.pop().map(str::to_string);
    let first = (!words.is_empty()).then(|| words.join(" "));
    (first, last)
}
