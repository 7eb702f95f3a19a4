//! # Section Splitter
//!
//! Splits a source file into independent document sections.

use crate::resource::ResourceOptions;
use tracing::debug;

/// Document separator: a newline followed by three dashes
const SEPARATOR: &str = "\n---";

/// One document section of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    /// Position of the section in the file, counting dropped sections
    pub index: usize,
    pub content: String,
    pub options: ResourceOptions,
}

/// Split file content into sections, dropping blank and comment-only ones
pub fn split_sections(content: &str) -> Vec<RawSection> {
    content
        .split(SEPARATOR)
        .enumerate()
        .filter_map(|(index, candidate)| {
            if is_blank_or_comment(candidate) {
                debug!(section = index, "Skipping empty section");
                return None;
            }
            Some(RawSection {
                index,
                content: candidate.trim().to_string(),
                options: ResourceOptions {
                    validate: true,
                    needs_restart: false,
                },
            })
        })
        .collect()
}

fn is_blank_or_comment(section: &str) -> bool {
    section.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_only_section_dropped() {
        let content = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\n\n\n# nothing here\n\n";
        let sections = split_sections(content);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].index, 0);
        assert!(sections[0].content.ends_with("name: a"));
    }

    #[test]
    fn test_sections_are_trimmed_and_tagged() {
        let content = "\n\nkind: A\n---\nkind: B\n\n";
        let sections = split_sections(content);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].content, "kind: A");
        assert_eq!(sections[1].content, "kind: B");
        assert_eq!(sections[1].index, 1);
        assert!(sections[1].options.validate);
        assert!(!sections[1].options.needs_restart);
    }

    #[test]
    fn test_index_counts_dropped_sections() {
        let content = "# header only\n---\nkind: A\n";
        let sections = split_sections(content);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].index, 1);
    }

    #[test]
    fn test_empty_file_has_no_sections() {
        assert!(split_sections("").is_empty());
        assert!(split_sections("\n\n   \n").is_empty());
    }

    #[test]
    fn test_indented_comment_counts_as_comment() {
        assert!(split_sections("   # indented\n\t\n").is_empty());
    }
}
