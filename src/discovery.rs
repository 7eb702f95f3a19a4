//! # File Discovery
//!
//! Discovers resource template files in a source tree.
//!
//! Files are filtered by a match pattern and a list of exclude globs, both
//! evaluated against the root-relative path, then ordered by phase (see
//! [`PHASE_PREFIXES`]) and path. The reserved `TRASH` directory is only walked
//! in trash mode, where it becomes the discovery root.

use crate::constants::{PHASE_PREFIXES, TRASH_DIR};
use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Discovery inputs
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Globs matched against root-relative paths; matching files are skipped
    pub exclude: Vec<String>,
    /// Optional match pattern, normalized by [`normalize_match_pattern`]
    pub pattern: Option<String>,
    /// Walk the `TRASH` directory instead of the live tree
    pub trash: bool,
}

/// A file selected for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Path relative to the discovery root
    pub relative: PathBuf,
    pub phase: usize,
}

/// Normalize a user supplied match pattern
///
/// - empty → `**/*`
/// - a single path segment gets a `**/` prefix
/// - a pattern without extension gets `.yaml` appended
pub fn normalize_match_pattern(pattern: Option<&str>) -> String {
    let mut pattern = match pattern.map(str::trim) {
        None | Some("") => "**/*".to_string(),
        Some(p) => p.to_string(),
    };
    if !pattern.contains('/') {
        pattern = format!("**/{pattern}");
    }
    if Path::new(&pattern).extension().is_none() {
        pattern.push_str(".yaml");
    }
    pattern
}

/// Phase bucket of a file, derived from its file name prefix
pub fn phase_index(path: &Path) -> usize {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    PHASE_PREFIXES
        .iter()
        .position(|prefix| file_name.starts_with(prefix))
        .unwrap_or(PHASE_PREFIXES.len())
}

/// Walk `root` and return the files to process, in application order
#[allow(
    clippy::missing_errors_doc,
    reason = "Errors are invalid globs and directory walk failures"
)]
pub fn discover_files(root: &Path, options: &DiscoveryOptions) -> Result<Vec<DiscoveredFile>> {
    let root = if options.trash {
        root.join(TRASH_DIR)
    } else {
        root.to_path_buf()
    };

    let pattern = normalize_match_pattern(options.pattern.as_deref());
    let include = Pattern::new(&pattern)
        .with_context(|| format!("Invalid match pattern '{pattern}'"))?;
    let excludes = options
        .exclude
        .iter()
        .map(|glob| Pattern::new(glob).with_context(|| format!("Invalid exclude glob '{glob}'")))
        .collect::<Result<Vec<_>>>()?;

    debug!(root = %root.display(), pattern = %pattern, "Discovering files");

    let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
        // The trash directory is only reachable as the root itself
        !(entry.depth() == 1 && entry.file_type().is_dir() && entry.file_name() == TRASH_DIR)
    });

    let mut files = Vec::new();
    for entry in walker {
        let entry =
            entry.with_context(|| format!("Failed to walk source tree {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path).to_path_buf();

        if let Some(exclude) = excludes
            .iter()
            .find(|p| p.matches_path_with(&relative, MATCH_OPTIONS))
        {
            info!(
                file = %relative.display(),
                exclude = %exclude.as_str(),
                "Skipping excluded file"
            );
            continue;
        }
        if !include.matches_path_with(&relative, MATCH_OPTIONS) {
            continue;
        }

        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            phase: phase_index(&relative),
            relative,
        });
    }

    files.sort_by(|a, b| a.phase.cmp(&b.phase).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}
