use crate::metadata::MetadataRecord;
use crate::sanitize::{cleanup_path, normalize_path, sanitize_token_value};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Literal text longer than this is likely to push real paths past common limits.
const LITERAL_LENGTH_WARNING: usize = 200;

pub const TOKEN_NAMES: &[&str] = &[
    "title",
    "titleSortable",
    "author",
    "author.sortname",
    "author.fullname",
    "author.firstname",
    "author.lastname",
    "bookseries",
    "bookseries.title",
    "bookseries.number",
    "bookseries.titleSortable",
    "publicationyear",
    "publicationyear.decade",
    "decade",
    "decade.short",
    "language",
    "format",
    "category",
    "genre",
    "ext",
    "originalFilename",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub token: Token,
    pub selector: Option<Selector>,
    pub modifier: Option<Modifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Index(usize),
    Slice(usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    First,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Title,
    TitleSortable,
    AuthorSortName,
    AuthorFullName,
    AuthorFirstName,
    AuthorLastName,
    SeriesTitle,
    SeriesNumber,
    SeriesTitleSortable,
    PublicationYear,
    Decade,
    DecadeShort,
    Language,
    Format,
    Category,
    Genre,
    Ext,
    OriginalFilename,
    Unknown(String),
}

impl Token {
    pub fn from_name(name: &str) -> Self {
        match name {
            "title" => Token::Title,
            "titleSortable" => Token::TitleSortable,
            "author.sortname" => Token::AuthorSortName,
            "author" | "author.fullname" => Token::AuthorFullName,
            "author.firstname" => Token::AuthorFirstName,
            "author.lastname" => Token::AuthorLastName,
            "bookseries" | "bookseries.title" => Token::SeriesTitle,
            "bookseries.number" => Token::SeriesNumber,
            "bookseries.titleSortable" => Token::SeriesTitleSortable,
            "publicationyear" => Token::PublicationYear,
            "decade" | "publicationyear.decade" => Token::Decade,
            "decade.short" => Token::DecadeShort,
            "language" => Token::Language,
            "format" => Token::Format,
            "category" => Token::Category,
            "genre" => Token::Genre,
            "ext" => Token::Ext,
            "originalFilename" => Token::OriginalFilename,
            other => Token::Unknown(other.to_string()),
        }
    }

    fn names_item(&self) -> bool {
        matches!(
            self,
            Token::Title
                | Token::TitleSortable
                | Token::AuthorSortName
                | Token::AuthorFullName
                | Token::AuthorFirstName
                | Token::AuthorLastName
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,
    #[error("unbalanced `${{` / `}}` in template")]
    UnbalancedBraces,
    #[error("empty placeholder `${{}}`")]
    EmptyPlaceholder,
    #[error("invalid index in placeholder `${{{0}}}`")]
    InvalidSelector(String),
}

/// Result of resolving a template against one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Relative path with `/` separators; empty when every part was omitted.
    pub path: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternValidation {
    pub is_valid: bool,
    pub warnings: Vec<String>,
}

pub fn validate_template(input: &str) -> Result<(), TemplateError> {
    parse_template(input).map(|_| ())
}

/// Live-feedback validation: hard errors make the pattern invalid, everything
/// else is reported as a warning.
pub fn validate_pattern(input: &str) -> PatternValidation {
    let parts = match parse_template(input) {
        Ok(parts) => parts,
        Err(err) => {
            return PatternValidation {
                is_valid: false,
                warnings: vec![err.to_string()],
            };
        }
    };

    let mut warnings = Vec::new();
    let mut has_name = false;
    let mut has_ext = false;
    let mut literal_len = 0usize;

    for part in &parts {
        match part {
            TemplatePart::Literal(text) => literal_len += text.chars().count(),
            TemplatePart::Placeholder(placeholder) => {
                match &placeholder.token {
                    Token::Unknown(name) => warnings.push(unknown_token_warning(name)),
                    Token::Ext => has_ext = true,
                    token if token.names_item() => has_name = true,
                    _ => {}
                }
                if let Some(Modifier::Unknown(name)) = &placeholder.modifier {
                    warnings.push(unknown_modifier_warning(name));
                }
            }
        }
    }

    if !has_name {
        warnings.push("template has no title or author token".to_string());
    }
    if !has_ext {
        warnings.push("template has no `${ext}` token".to_string());
    }
    if literal_len > LITERAL_LENGTH_WARNING {
        warnings.push(format!(
            "literal text is {literal_len} characters; paths may exceed filesystem limits"
        ));
    }

    PatternValidation {
        is_valid: true,
        warnings,
    }
}

pub fn parse_template(input: &str) -> Result<Vec<TemplatePart>, TemplateError> {
    if input.trim().is_empty() {
        return Err(TemplateError::Empty);
    }
    if input.matches("${").count() != input.matches('}').count() {
        return Err(TemplateError::UnbalancedBraces);
    }

    let mut parts = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        push_literal(&mut parts, &rest[..start])?;
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(TemplateError::UnbalancedBraces)?;
        let inner = &after[..end];
        if inner.contains("${") {
            return Err(TemplateError::UnbalancedBraces);
        }
        parts.push(TemplatePart::Placeholder(parse_placeholder(inner)?));
        rest = &after[end + 1..];
    }
    push_literal(&mut parts, rest)?;

    Ok(parts)
}

pub fn resolve_template<R: MetadataRecord + ?Sized>(
    template: &str,
    record: &R,
    companion_extension: Option<&str>,
) -> Result<Rendered, TemplateError> {
    let parts = parse_template(template)?;
    Ok(render_template(&parts, record, companion_extension))
}

/// Renders parsed parts, deleting empty placeholders and running the cleanup
/// pipeline before normalizing the result into a relative path.
///
/// `companion_extension` overrides `${ext}` when rendering a companion file.
pub fn render_template<R: MetadataRecord + ?Sized>(
    parts: &[TemplatePart],
    record: &R,
    companion_extension: Option<&str>,
) -> Rendered {
    let mut output = String::new();
    let mut warnings = Vec::new();

    for part in parts {
        match part {
            TemplatePart::Literal(text) => output.push_str(text),
            TemplatePart::Placeholder(placeholder) => {
                if let Token::Unknown(name) = &placeholder.token {
                    warn!(token = %name, "unknown template token resolved to empty");
                    warnings.push(unknown_token_warning(name));
                }
                let mut value = token_value(&placeholder.token, record, companion_extension);
                if let Some(selector) = placeholder.selector {
                    value = apply_selector(&value, selector);
                }
                match &placeholder.modifier {
                    Some(Modifier::First) => value = first_letter(&value),
                    Some(Modifier::Unknown(name)) => {
                        warnings.push(unknown_modifier_warning(name));
                    }
                    None => {}
                }
                output.push_str(&sanitize_token_value(&value));
            }
        }
    }

    Rendered {
        path: normalize_path(&cleanup_path(&output)),
        warnings,
    }
}

fn push_literal(parts: &mut Vec<TemplatePart>, text: &str) -> Result<(), TemplateError> {
    if text.contains('}') {
        return Err(TemplateError::UnbalancedBraces);
    }
    if !text.is_empty() {
        parts.push(TemplatePart::Literal(text.to_string()));
    }
    Ok(())
}

fn parse_placeholder(inner: &str) -> Result<Placeholder, TemplateError> {
    let inner = inner.trim();
    let (body, modifier) = match inner.split_once(';') {
        Some((body, modifier)) => (body.trim(), Some(parse_modifier(modifier.trim()))),
        None => (inner, None),
    };

    let (name, selector) = match body.find('[') {
        Some(open) => {
            let index = body[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| TemplateError::InvalidSelector(inner.to_string()))?;
            let selector = parse_selector(index)
                .ok_or_else(|| TemplateError::InvalidSelector(inner.to_string()))?;
            (body[..open].trim(), Some(selector))
        }
        None => (body, None),
    };

    if name.is_empty() {
        return Err(TemplateError::EmptyPlaceholder);
    }

    Ok(Placeholder {
        token: Token::from_name(name),
        selector,
        modifier,
    })
}

fn parse_selector(index: &str) -> Option<Selector> {
    match index.split_once(',') {
        Some((start, end)) => {
            let start = start.trim().parse().ok()?;
            let end = end.trim().parse().ok()?;
            Some(Selector::Slice(start, end))
        }
        None => index.trim().parse().ok().map(Selector::Index),
    }
}

fn parse_modifier(name: &str) -> Modifier {
    match name {
        "first" => Modifier::First,
        other => Modifier::Unknown(other.to_string()),
    }
}

fn token_value<R: MetadataRecord + ?Sized>(
    token: &Token,
    record: &R,
    companion_extension: Option<&str>,
) -> String {
    let value = match token {
        Token::Title => record.title().map(str::to_string),
        Token::TitleSortable => record.title_sort(),
        Token::AuthorSortName => record.author_sort(),
        Token::AuthorFullName => record.author_full().map(str::to_string),
        Token::AuthorFirstName => record.author_first(),
        Token::AuthorLastName => record.author_last(),
        Token::SeriesTitle => record.series().map(str::to_string),
        Token::SeriesNumber => record.series_number().map(format_series_number),
        Token::SeriesTitleSortable => record.series_sort(),
        Token::PublicationYear => record.publication_year().map(|y| y.to_string()),
        Token::Decade => record
            .publication_year()
            .map(|y| format!("{}s", y - y.rem_euclid(10))),
        Token::DecadeShort => record
            .publication_year()
            .map(|y| format!("{:02}s", y.rem_euclid(100) / 10 * 10)),
        Token::Language => record.language().map(str::to_string),
        Token::Format => record
            .format()
            .map(str::to_string)
            .or_else(|| primary_extension(record).map(|ext| ext.to_uppercase())),
        Token::Category => record.category().map(str::to_string),
        Token::Genre => record.genre().map(str::to_string),
        Token::Ext => match companion_extension {
            Some(ext) => Some(ext.trim_start_matches('.').to_string()),
            None => primary_extension(record),
        },
        Token::OriginalFilename => record.original_filename().and_then(|name| {
            Path::new(name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
        }),
        Token::Unknown(_) => None,
    };
    value.unwrap_or_default()
}

fn primary_extension<R: MetadataRecord + ?Sized>(record: &R) -> Option<String> {
    record.extension().map(str::to_string).or_else(|| {
        record.original_filename().and_then(|name| {
            Path::new(name)
                .extension()
                .map(|ext| ext.to_string_lossy().to_string())
        })
    })
}

/// Pads whole series numbers to two digits; anything non-numeric passes through.
fn format_series_number(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u32>() {
        return format!("{n:02}");
    }
    if let Some((whole, fraction)) = raw.split_once('.') {
        let fraction_is_digits =
            !fraction.is_empty() && fraction.chars().all(|c| c.is_ascii_digit());
        if let (Ok(n), true) = (whole.parse::<u32>(), fraction_is_digits) {
            return format!("{n:02}.{fraction}");
        }
    }
    raw.to_string()
}

fn apply_selector(value: &str, selector: Selector) -> String {
    let len = value.chars().count();
    match selector {
        Selector::Index(i) => value.chars().nth(i).map(String::from).unwrap_or_default(),
        Selector::Slice(start, end) => {
            let end = end.min(len);
            if start >= end {
                return String::new();
            }
            value.chars().skip(start).take(end - start).collect()
        }
    }
}

/// First letter for alphabetical shelving; anything non-alphabetic goes to `#`.
fn first_letter(value: &str) -> String {
    match value.trim().chars().next() {
        Some(ch) if ch.is_alphabetic() => ch.to_uppercase().collect(),
        Some(_) => "#".to_string(),
        None => String::new(),
    }
}

fn unknown_token_warning(name: &str) -> String {
    format!("unknown token `${{{name}}}` resolves to empty")
}

fn unknown_modifier_warning(name: &str) -> String {
    format!("unknown modifier `;{name}` ignored")
}
