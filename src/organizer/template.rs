//! Destination path synthesis.
//!
//! Templates are strings with `%field%` placeholders, e.g.
//! `%author%/%series%/%series_position% - %title%/%title%`. A template
//! expands to a path relative to the destination root; the source file's
//! extension is appended when the template does not already end with it.
//!
//! Selection, first match wins:
//! 1. an explicit override in [`PathOptions`]
//! 2. the multi-file template for books with several parts
//! 3. the series template when the candidate names a series
//! 4. the non-series template

use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::OrganizeError;
use crate::config::TemplateConfig;
use crate::model::MetadataCandidate;

/// Longest destination path, in characters, that we will produce.
pub const MAX_PATH_LEN: usize = 240;

pub const SERIES_TEMPLATE: &str = "%author%/%series%/%series_position% - %title%/%title%";
pub const NON_SERIES_TEMPLATE: &str = "%author%/%title%/%title%";
pub const SINGLE_FILE_TEMPLATE: &str = "%author%/%title%";
pub const MULTI_FILE_TEMPLATE: &str = "%author%/%title%/%title% - Part %part_number%";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([a-z_]+)%").expect("valid regex"));
static SPACE_BEFORE_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" +\.").expect("valid regex"));
static REPEATED_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("valid regex"));

/// Which template to expand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTemplate {
    Series,
    NonSeries,
    SingleFile,
    MultiFilePart,
    Custom(String),
}

impl PathTemplate {
    /// Built-in names map to built-in templates; anything else is a raw
    /// template string.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "series" => PathTemplate::Series,
            "non_series" | "standalone" => PathTemplate::NonSeries,
            "single" | "single_file" => PathTemplate::SingleFile,
            "multi" | "multi_file" | "part" => PathTemplate::MultiFilePart,
            _ => PathTemplate::Custom(raw.to_string()),
        }
    }
}

/// Template strings for the four built-in kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub series: String,
    pub non_series: String,
    pub single_file: String,
    pub multi_file: String,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self {
            series: SERIES_TEMPLATE.to_string(),
            non_series: NON_SERIES_TEMPLATE.to_string(),
            single_file: SINGLE_FILE_TEMPLATE.to_string(),
            multi_file: MULTI_FILE_TEMPLATE.to_string(),
        }
    }
}

impl TemplateSet {
    /// Built-ins, with any configured replacements applied.
    pub fn from_config(config: &TemplateConfig) -> Self {
        let defaults = Self::default();
        let pick = |custom: &Option<String>, default: String| {
            custom
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or(default)
        };
        Self {
            series: pick(&config.series, defaults.series),
            non_series: pick(&config.non_series, defaults.non_series),
            single_file: pick(&config.single_file, defaults.single_file),
            multi_file: pick(&config.multi_file, defaults.multi_file),
        }
    }

    fn pattern<'a>(&'a self, template: &'a PathTemplate) -> &'a str {
        match template {
            PathTemplate::Series => &self.series,
            PathTemplate::NonSeries => &self.non_series,
            PathTemplate::SingleFile => &self.single_file,
            PathTemplate::MultiFilePart => &self.multi_file,
            PathTemplate::Custom(raw) => raw,
        }
    }
}

/// Per-call options for [`PathTemplateEngine::generate_target_path`].
#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    pub template: Option<PathTemplate>,
    pub is_multi_file: bool,
    /// 1-based part number
    pub part_number: Option<u32>,
}

/// Expands templates into sanitized destination paths.
#[derive(Debug, Clone, Default)]
pub struct PathTemplateEngine {
    templates: TemplateSet,
}

impl PathTemplateEngine {
    pub fn new(templates: TemplateSet) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Pick the template for this candidate.
    pub fn select(&self, candidate: &MetadataCandidate, options: &PathOptions) -> PathTemplate {
        if let Some(ref template) = options.template {
            return template.clone();
        }
        if options.is_multi_file {
            return PathTemplate::MultiFilePart;
        }
        let has_series = candidate
            .series
            .as_ref()
            .is_some_and(|s| !s.name.trim().is_empty());
        if has_series {
            PathTemplate::Series
        } else {
            PathTemplate::NonSeries
        }
    }

    /// Destination for `source` under `base_dir`.
    pub fn generate_target_path(
        &self,
        candidate: &MetadataCandidate,
        source: &Path,
        base_dir: &Path,
        options: &PathOptions,
    ) -> Result<PathBuf, OrganizeError> {
        let template = self.select(candidate, options);
        let expanded = expand(self.templates.pattern(&template), candidate, options.part_number);
        let extension = source.extension().and_then(|e| e.to_str()).unwrap_or("");
        let relative = tidy(&expanded, extension);
        if relative.is_empty() {
            return Err(OrganizeError::EmptyPath {
                template: self.templates.pattern(&template).to_string(),
            });
        }

        let relative = sanitize_chars(&relative);
        // +1 for the separator joining base and relative
        let base_len = base_dir.to_string_lossy().chars().count() + 1;
        let budget = MAX_PATH_LEN.saturating_sub(base_len);
        let relative = fit_final_segment(&relative, budget).ok_or_else(|| {
            OrganizeError::PathTooLong {
                path: base_dir.join(&relative),
                max: MAX_PATH_LEN,
            }
        })?;

        Ok(base_dir.join(relative))
    }

    /// Destinations for every part of one book, numbered 1..n in the order
    /// given.
    pub fn organize_multiple_files(
        &self,
        candidate: &MetadataCandidate,
        sources: &[PathBuf],
        base_dir: &Path,
        template: Option<PathTemplate>,
    ) -> Result<Vec<PathBuf>, OrganizeError> {
        let is_multi_file = sources.len() > 1;
        sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                let options = PathOptions {
                    template: template.clone(),
                    is_multi_file,
                    part_number: is_multi_file.then_some(i as u32 + 1),
                };
                self.generate_target_path(candidate, source, base_dir, &options)
            })
            .collect()
    }
}

/// Zero-pad integers to two digits; leave labels like "Book One" alone.
fn pad_number(value: &str) -> String {
    match value.trim().parse::<u32>() {
        Ok(n) => format!("{:02}", n),
        Err(_) => value.trim().to_string(),
    }
}

fn or_unknown(value: Option<&str>, what: &str) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.to_string(),
        None => format!("Unknown {}", what),
    }
}

fn field_value(
    field: &str,
    candidate: &MetadataCandidate,
    part_number: Option<u32>,
) -> Option<String> {
    let value = match field {
        "author" => or_unknown(candidate.primary_author(), "Author"),
        "narrator" => or_unknown(candidate.primary_narrator(), "Narrator"),
        "title" => or_unknown(Some(&candidate.title), "Title"),
        "genre" => or_unknown(candidate.genres.first().map(String::as_str), "Genre"),
        "publisher" => or_unknown(candidate.publisher.as_deref(), "Publisher"),
        "series" => candidate
            .series
            .as_ref()
            .map(|s| s.name.trim().to_string())
            .unwrap_or_default(),
        "series_position" => candidate
            .series
            .as_ref()
            .and_then(|s| s.position.as_deref())
            .map(pad_number)
            .unwrap_or_default(),
        "part_number" => part_number.map(|n| format!("{:02}", n)).unwrap_or_default(),
        "year" => candidate
            .release_year
            .map(|y| y.to_string())
            .unwrap_or_default(),
        "asin" => candidate.asin.clone().unwrap_or_default(),
        _ => return None,
    };
    // A value must never introduce a new path segment
    Some(value.replace('/', "_"))
}

fn expand(template: &str, candidate: &MetadataCandidate, part_number: Option<u32>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            field_value(&caps[1], candidate, part_number).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Post-substitution cleanup: drop empty and dot-only segments, strip spaces
/// before dots, trim each segment, then make sure the extension is present.
fn tidy(expanded: &str, extension: &str) -> String {
    let segments: Vec<String> = expanded
        .split('/')
        .map(|segment| SPACE_BEFORE_DOT.replace_all(segment.trim(), ".").trim().to_string())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if segment.chars().all(|c| c == '.') {
                "_".to_string()
            } else {
                segment
            }
        })
        .collect();

    let mut path = segments.join("/");
    if path.is_empty() || extension.is_empty() {
        return path;
    }
    let suffix = format!(".{}", extension.to_lowercase());
    if !path.to_lowercase().ends_with(&suffix) {
        path.push('.');
        path.push_str(extension);
    }
    path
}

fn sanitize_chars(path: &str) -> String {
    let replaced: String = path
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' => '_',
            _ => c,
        })
        .collect();
    REPEATED_SPACES.replace_all(&replaced, " ").into_owned()
}

/// Shorten the final segment's base name so the whole path fits in `max`
/// characters. Directories and the extension are kept intact.
fn fit_final_segment(path: &str, max: usize) -> Option<String> {
    let total = path.chars().count();
    if total <= max {
        return Some(path.to_string());
    }

    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };
    let (stem, ext) = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file, None),
    };

    let excess = total - max;
    let keep = stem.chars().count().checked_sub(excess)?;
    let stem: String = stem.chars().take(keep).collect();
    let stem = stem.trim_end();
    if stem.is_empty() {
        return None;
    }

    let mut out = String::new();
    if let Some(dir) = dir {
        out.push_str(dir);
        out.push('/');
    }
    out.push_str(stem);
    if let Some(ext) = ext {
        out.push('.');
        out.push_str(ext);
    }
    Some(out)
}

/// Replace characters illegal on common filesystems, collapse repeated
/// spaces and shorten the final segment to fit [`MAX_PATH_LEN`].
///
/// Sanitizing an already-sanitized path returns it unchanged.
pub fn sanitize_path(path: &str) -> String {
    let cleaned = sanitize_chars(path);
    fit_final_segment(&cleaned, MAX_PATH_LEN).unwrap_or(cleaned)
}
