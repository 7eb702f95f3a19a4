//! # Template Renderer
//!
//! Renders sections with minijinja using delimiters that do not collide with
//! YAML or JSON braces:
//!
//! - Expressions: `[[ ... ]]`
//! - Blocks: `[% ... %]`
//! - Comments: `[# ... #]`
//!
//! Templates render without a data context. Everything dynamic comes from the
//! functions of a [`FunctionRegistry`].

use super::functions::FunctionRegistry;
use minijinja::syntax::SyntaxConfig;
use minijinja::{context, Environment, UndefinedBehavior};
use thiserror::Error;

/// Errors that can occur while rendering a section
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A secret lookup was skipped on request. Callers that asked for skipping
    /// drop the section instead of failing the file.
    #[error("secret lookup skipped")]
    SecretSkipped,
    #[error("template render error: {0:#}")]
    Render(#[source] minijinja::Error),
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        if raised_secret_skipped(&err) {
            TemplateError::SecretSkipped
        } else {
            TemplateError::Render(err)
        }
    }
}

/// Marker attached as the source of errors raised by skipped secret lookups
#[derive(Debug, Error)]
#[error("secret lookup skipped")]
pub struct SecretSkipped;

fn raised_secret_skipped(err: &minijinja::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<SecretSkipped>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Section renderer
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer").finish_non_exhaustive()
    }
}

impl TemplateRenderer {
    /// Build a renderer with the registry's functions installed
    #[allow(
        clippy::missing_errors_doc,
        reason = "Fails only if the delimiter configuration is rejected"
    )]
    pub fn new(registry: &FunctionRegistry) -> Result<Self, TemplateError> {
        let syntax = SyntaxConfig::builder()
            .variable_delimiters("[[", "]]")
            .block_delimiters("[%", "%]")
            .comment_delimiters("[#", "#]")
            .build()?;

        let mut env = Environment::new();
        env.set_syntax(syntax);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        registry.install(&mut env);

        Ok(Self { env })
    }

    /// Render one section
    #[allow(clippy::missing_errors_doc, reason = "See TemplateError")]
    pub fn render(&self, section: &str) -> Result<String, TemplateError> {
        Ok(self.env.render_str(section, context! {})?)
    }
}
