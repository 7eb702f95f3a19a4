//! # Render
//!
//! Turns the raw bytes of one source file into generic resources:
//!
//! 1. [`splitter`] cuts the file into sections on `\n---`
//! 2. [`template`] renders each section through the function registry
//! 3. [`parser`] decodes the rendered text and explodes list documents
//!
//! A section that fails with the "secret skipped" sentinel is dropped when the
//! caller asked for secret skipping. Any other failure aborts the file.

pub mod functions;
pub mod parser;
pub mod splitter;
pub mod template;

pub use functions::FunctionRegistry;
pub use parser::parse_documents;
pub use splitter::{split_sections, RawSection};
pub use template::{SecretSkipped, TemplateError, TemplateRenderer};

use crate::error::PipelineError;
use crate::resource::Resource;
use tracing::{debug, info};

/// Resources produced from one source file
#[derive(Debug, Clone, Default)]
pub struct RenderedFile {
    pub resources: Vec<Resource>,
    /// Non-empty sections in the file
    pub sections: usize,
    /// Sections dropped because they needed a skipped secret
    pub skipped: usize,
}

/// Split, render and parse one file
#[allow(clippy::missing_errors_doc, reason = "See PipelineError")]
pub fn render_file(
    content: &str,
    renderer: &TemplateRenderer,
    skip_secrets: bool,
) -> Result<RenderedFile, PipelineError> {
    let sections = split_sections(content);
    let mut rendered = RenderedFile {
        sections: sections.len(),
        ..RenderedFile::default()
    };

    for section in sections {
        match renderer.render(&section.content) {
            Ok(text) => {
                let resources = parse_documents(&text, section.options)?;
                debug!(
                    section = section.index,
                    resources = resources.len(),
                    "Rendered section"
                );
                rendered.resources.extend(resources);
            }
            Err(TemplateError::SecretSkipped) if skip_secrets => {
                info!(section = section.index, "Skipping section that reads a secret");
                rendered.skipped += 1;
            }
            Err(source) => {
                return Err(PipelineError::Template {
                    section: section.index,
                    source,
                });
            }
        }
    }

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SecretLookup;
    use std::sync::Arc;

    struct NoSecrets;

    impl SecretLookup for NoSecrets {
        fn secret_value(&self, _name: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }

    const FILE: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: plain\n---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\nstringData:\n  token: [[ secret(\"token\") ]]\n---\n# trailing comment\n";

    fn renderer(skip: bool) -> TemplateRenderer {
        let registry = FunctionRegistry::standard().with_secrets(Arc::new(NoSecrets), skip);
        TemplateRenderer::new(&registry).unwrap()
    }

    #[test]
    fn test_skipped_secret_section_is_dropped_when_skipping() {
        let rendered = render_file(FILE, &renderer(true), true).unwrap();
        assert_eq!(rendered.sections, 2);
        assert_eq!(rendered.skipped, 1);
        assert_eq!(rendered.resources.len(), 1);
        assert_eq!(rendered.resources[0].name(), "plain");
    }

    #[test]
    fn test_skipped_secret_aborts_file_when_not_skipping() {
        // The registry raises the sentinel but the caller did not ask to skip
        let err = render_file(FILE, &renderer(true), false).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Template {
                section: 1,
                source: TemplateError::SecretSkipped
            }
        ));
    }

    #[test]
    fn test_lookup_failure_aborts_file() {
        let err = render_file(FILE, &renderer(false), false).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Template {
                source: TemplateError::Render(_),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_error_aborts_file() {
        let err = render_file("kind: [oops", &renderer(false), false).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }
}
