use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::{DirEntry, WalkDir};

use crate::config::ScanConfig;
use crate::events::{Event, EventSink};
use crate::model::FileEntry;

/// Extensions accepted when no explicit list is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "m4b", "aac", "flac", "ogg", "opus", "wma", "wav",
];

/// Scan failures. Only an unreadable root ever fails a scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Cannot read scan root {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read directory {path}: {message}")]
    SubdirectoryRead { path: PathBuf, message: String },

    #[error("Scan task failed: {0}")]
    TaskJoin(String),
}

/// A path exclusion. The first matching rule excludes a file.
#[derive(Debug, Clone)]
pub enum ExclusionRule {
    /// Plain substring match against the full path
    Contains(String),
    /// Regular expression match against the full path
    Pattern(Regex),
}

impl ExclusionRule {
    /// Parse a config entry: `re:<regex>` or a plain substring.
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        match raw.strip_prefix("re:") {
            Some(pattern) => Ok(Self::Pattern(Regex::new(pattern)?)),
            None => Ok(Self::Contains(raw.to_string())),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Contains(needle) => path.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(path),
        }
    }
}

/// Options controlling a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Hard ceiling on traversal depth; files directly under the root are depth 1
    pub max_depth: usize,
    pub include_hidden: bool,
    pub follow_symlinks: bool,
    pub min_size: u64,
    pub max_size: u64,
    /// Lower-case extensions without the dot
    pub extensions: Vec<String>,
    pub exclude: Vec<ExclusionRule>,
    /// Emit a progress event every this many accepted files
    pub progress_interval: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl ScanOptions {
    /// Build options from the `[scan]` config section.
    ///
    /// Invalid exclusion regexes are logged and dropped.
    pub fn from_config(config: &ScanConfig) -> Self {
        let exclude = config
            .exclude
            .iter()
            .filter_map(|raw| match ExclusionRule::parse(raw) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(target: "scanner", rule = %raw, error = %e, "Ignoring invalid exclusion rule");
                    None
                }
            })
            .collect();

        Self {
            max_depth: config.max_depth,
            include_hidden: config.include_hidden,
            follow_symlinks: config.follow_symlinks,
            min_size: config.min_size,
            max_size: config.max_size,
            extensions: config.extensions.iter().map(|e| e.to_lowercase()).collect(),
            exclude,
            progress_interval: config.progress_interval.max(1),
        }
    }

    fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.exclude.iter().any(|rule| rule.matches(path))
    }
}

/// Walks directory trees and collects candidate audio files.
pub struct DirectoryScanner {
    events: Arc<dyn EventSink>,
}

impl DirectoryScanner {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }

    /// Scan `root` and return every qualifying file.
    ///
    /// Fails only when the root itself cannot be read. Unreadable
    /// subdirectories and broken or circular links are logged and skipped.
    pub async fn scan(
        &self,
        root: &Path,
        options: &ScanOptions,
    ) -> Result<Vec<FileEntry>, ScanError> {
        if let Err(source) = std::fs::read_dir(root) {
            let err = ScanError::RootUnreadable {
                path: root.to_path_buf(),
                source,
            };
            self.events.emit(Event::ScanFailed {
                root: root.to_path_buf(),
                error: err.to_string(),
            });
            return Err(err);
        }

        let root_buf = root.to_path_buf();
        let options = options.clone();
        let events = Arc::clone(&self.events);

        // Traversal is synchronous; keep it off the async thread.
        let walked =
            tokio::task::spawn_blocking(move || walk(&root_buf, &options, events.as_ref())).await;

        match walked {
            Ok(files) => Ok(files),
            Err(e) => {
                let err = ScanError::TaskJoin(e.to_string());
                self.events.emit(Event::ScanFailed {
                    root: root.to_path_buf(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn walk(root: &Path, options: &ScanOptions, events: &dyn EventSink) -> Vec<FileEntry> {
    let started = Instant::now();
    let mut files = Vec::new();
    let mut entries_seen = 0usize;
    let mut skipped_dirs = 0usize;

    let walker = WalkDir::new(root)
        .max_depth(options.max_depth)
        .follow_links(options.follow_symlinks)
        .into_iter()
        .filter_entry(|e| options.include_hidden || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                skipped_dirs += 1;
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                let warning = if e.loop_ancestor().is_some() {
                    ScanError::SubdirectoryRead {
                        path,
                        message: "symbolic link loop".to_string(),
                    }
                } else {
                    ScanError::SubdirectoryRead {
                        path,
                        message: e.to_string(),
                    }
                };
                tracing::warn!(target: "scanner::walk", "{warning}, skipping");
                continue;
            }
        };
        entries_seen += 1;

        if entry.path_is_symlink() && !options.follow_symlinks {
            tracing::debug!(target: "scanner::walk", path = %entry.path().display(), "Skipping symbolic link");
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(file) = qualify(&entry, options) else {
            continue;
        };
        files.push(file);

        if files.len() % options.progress_interval == 0 {
            events.emit(Event::ScanProgress {
                root: root.to_path_buf(),
                files_found: files.len(),
                entries_seen,
            });
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        target: "scanner",
        root = %root.display(),
        files = files.len(),
        skipped_dirs,
        elapsed_ms,
        "Scan complete"
    );
    events.emit(Event::ScanCompleted {
        root: root.to_path_buf(),
        files_found: files.len(),
        skipped_dirs,
        elapsed_ms,
    });
    files
}

/// Apply the extension, size and exclusion filters, in that order.
fn qualify(entry: &DirEntry, options: &ScanOptions) -> Option<FileEntry> {
    let path = entry.path();
    let extension = path.extension()?.to_str()?.to_lowercase();
    if !options.accepts_extension(&extension) {
        return None;
    }

    // With link following on, this stats the link target.
    let metadata = match entry.metadata() {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(target: "scanner::walk", path = %path.display(), error = %e, "Cannot stat file, skipping");
            return None;
        }
    };
    let size = metadata.len();
    if size < options.min_size || size > options.max_size {
        return None;
    }

    if options.is_excluded(&path.to_string_lossy()) {
        tracing::debug!(target: "scanner::walk", path = %path.display(), "Excluded");
        return None;
    }

    Some(FileEntry {
        path: path.to_path_buf(),
        name: entry.file_name().to_string_lossy().into_owned(),
        directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        extension,
        size,
        created: metadata.created().ok().map(DateTime::<Utc>::from),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::test_utils::RecordingSink;
    use std::fs;
    use tempfile::tempdir;

    fn write_file(path: &Path, size: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![0u8; size]).unwrap();
    }

    fn small_files() -> ScanOptions {
        ScanOptions {
            min_size: 0,
            ..Default::default()
        }
    }

    fn names(files: &[FileEntry]) -> Vec<String> {
        let mut names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_scan_audio_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        write_file(&root.join("book.mp3"), 10);
        write_file(&root.join("book.m4b"), 10);
        write_file(&root.join("notes.txt"), 10);
        write_file(&root.join("UPPERCASE.MP3"), 10);
        write_file(&root.join("subdir/part.flac"), 10);
        write_file(&root.join("subdir/cover.jpg"), 10);

        let sink = Arc::new(RecordingSink::default());
        let scanner = DirectoryScanner::new(sink.clone());
        let files = scanner.scan(root, &small_files()).await.unwrap();

        assert_eq!(
            names(&files),
            vec!["UPPERCASE.MP3", "book.m4b", "book.mp3", "part.flac"]
        );
        let upper = files.iter().find(|f| f.name == "UPPERCASE.MP3").unwrap();
        assert_eq!(upper.extension, "mp3");
        assert_eq!(upper.size, 10);
        assert_eq!(upper.directory, root);
        assert!(upper.modified.is_some());
        assert_eq!(sink.count(EventKind::ScanCompleted), 1);
    }

    #[tokio::test]
    async fn test_size_bounds_are_inclusive() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("tiny.mp3"), 5);
        write_file(&dir.path().join("exact_min.mp3"), 10);
        write_file(&dir.path().join("exact_max.mp3"), 20);
        write_file(&dir.path().join("huge.mp3"), 21);

        let options = ScanOptions {
            min_size: 10,
            max_size: 20,
            ..Default::default()
        };
        let scanner = DirectoryScanner::new(Arc::new(RecordingSink::default()));
        let files = scanner.scan(dir.path(), &options).await.unwrap();
        assert_eq!(names(&files), vec!["exact_max.mp3", "exact_min.mp3"]);
    }

    #[tokio::test]
    async fn test_hidden_entries_skipped_unless_included() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join(".hidden.mp3"), 10);
        write_file(&dir.path().join(".cache/inner.mp3"), 10);
        write_file(&dir.path().join("visible.mp3"), 10);

        let scanner = DirectoryScanner::new(Arc::new(RecordingSink::default()));
        let files = scanner.scan(dir.path(), &small_files()).await.unwrap();
        assert_eq!(names(&files), vec!["visible.mp3"]);

        let options = ScanOptions {
            include_hidden: true,
            ..small_files()
        };
        let files = scanner.scan(dir.path(), &options).await.unwrap();
        assert_eq!(names(&files), vec![".hidden.mp3", "inner.mp3", "visible.mp3"]);
    }

    #[tokio::test]
    async fn test_max_depth_is_a_hard_ceiling() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("top.mp3"), 10);
        write_file(&dir.path().join("a/one.mp3"), 10);
        write_file(&dir.path().join("a/b/two.mp3"), 10);

        let options = ScanOptions {
            max_depth: 2,
            ..small_files()
        };
        let scanner = DirectoryScanner::new(Arc::new(RecordingSink::default()));
        let files = scanner.scan(dir.path(), &options).await.unwrap();
        assert_eq!(names(&files), vec!["one.mp3", "top.mp3"]);
    }

    #[tokio::test]
    async fn test_exclusion_rules() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("keep/book.mp3"), 10);
        write_file(&dir.path().join("@eaDir/book.mp3"), 10);
        write_file(&dir.path().join("samples/sample-01.mp3"), 10);

        let options = ScanOptions {
            exclude: vec![
                ExclusionRule::parse("@eaDir").unwrap(),
                ExclusionRule::parse(r"re:sample-\d+").unwrap(),
            ],
            ..small_files()
        };
        let scanner = DirectoryScanner::new(Arc::new(RecordingSink::default()));
        let files = scanner.scan(dir.path(), &options).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("keep/book.mp3"));
    }

    #[test]
    fn test_invalid_exclusion_regex() {
        assert!(ExclusionRule::parse("re:(unclosed").is_err());
        assert!(matches!(
            ExclusionRule::parse("(fine as substring"),
            Ok(ExclusionRule::Contains(_))
        ));
    }

    #[tokio::test]
    async fn test_progress_events_at_interval() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            write_file(&dir.path().join(format!("{i:02}.mp3")), 10);
        }
        let options = ScanOptions {
            progress_interval: 2,
            ..small_files()
        };
        let sink = Arc::new(RecordingSink::default());
        let scanner = DirectoryScanner::new(sink.clone());
        scanner.scan(dir.path(), &options).await.unwrap();

        assert_eq!(sink.count(EventKind::ScanProgress), 2);
        assert_eq!(sink.count(EventKind::ScanCompleted), 1);
    }

    #[tokio::test]
    async fn test_unreadable_root_fails_scan() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let sink = Arc::new(RecordingSink::default());
        let scanner = DirectoryScanner::new(sink.clone());

        let result = scanner.scan(&missing, &small_files()).await;
        assert!(matches!(result, Err(ScanError::RootUnreadable { .. })));
        assert_eq!(sink.count(EventKind::ScanFailed), 1);
        assert_eq!(sink.count(EventKind::ScanCompleted), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_followed_only_when_enabled() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let library = dir.path().join("library");
        let outside = dir.path().join("outside");
        write_file(&outside.join("linked.mp3"), 10);
        write_file(&library.join("real.mp3"), 10);
        symlink(&outside, library.join("link-dir")).unwrap();
        symlink(library.join("nowhere.mp3"), library.join("broken.mp3")).unwrap();
        // Circular link back to the library root
        symlink(&library, library.join("loop")).unwrap();

        let scanner = DirectoryScanner::new(Arc::new(RecordingSink::default()));
        let files = scanner.scan(&library, &small_files()).await.unwrap();
        assert_eq!(names(&files), vec!["real.mp3"]);

        let options = ScanOptions {
            follow_symlinks: true,
            ..small_files()
        };
        let files = scanner.scan(&library, &options).await.unwrap();
        assert_eq!(names(&files), vec!["linked.mp3", "real.mp3"]);
    }
}
