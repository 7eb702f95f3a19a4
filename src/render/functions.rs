//! # Template Functions
//!
//! Name-to-function table installed into the template environment.
//!
//! The standard set covers environment lookups, encoding and hashing helpers.
//! Collaborators add their own functions on top, most notably `secret`, which
//! reads AWS Secrets Manager and raises [`SecretSkipped`] when secret skipping
//! is enabled.

use super::template::SecretSkipped;
use crate::provider::SecretLookup;
use base64::{engine::general_purpose, Engine as _};
use minijinja::{Environment, Error, ErrorKind, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Functions available to templates, keyed by name
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<&'static str, Value>,
}

impl FunctionRegistry {
    /// Registry holding the standard utility functions
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register("env", Value::from_function(env_var));
        registry.register("b64enc", Value::from_function(b64enc));
        registry.register("b64dec", Value::from_function(b64dec));
        registry.register("sha256sum", Value::from_function(sha256sum));
        registry.register("required", Value::from_function(required));
        registry.register("now", Value::from_function(now));
        registry
    }

    /// Add the `secret(name[, key])` function backed by `lookup`
    ///
    /// With `skip` set the function never calls `lookup` and fails with
    /// [`SecretSkipped`] instead.
    #[must_use]
    pub fn with_secrets(mut self, lookup: Arc<dyn SecretLookup>, skip: bool) -> Self {
        self.register(
            "secret",
            Value::from_function(move |name: String, key: Option<String>| {
                secret(lookup.as_ref(), skip, &name, key.as_deref())
            }),
        );
        self
    }

    /// Register (or replace) a function
    pub fn register(&mut self, name: &'static str, function: Value) {
        self.functions.insert(name, function);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }

    pub(crate) fn install(&self, env: &mut Environment<'static>) {
        for (name, function) in &self.functions {
            env.add_global(*name, function.clone());
        }
    }
}

fn env_var(name: String, default: Option<String>) -> Result<String, Error> {
    match std::env::var(&name) {
        Ok(value) => Ok(value),
        Err(_) => default.ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("environment variable {name} is not set"),
            )
        }),
    }
}

fn b64enc(value: String) -> String {
    general_purpose::STANDARD.encode(value.as_bytes())
}

fn b64dec(value: String) -> Result<String, Error> {
    let decoded = general_purpose::STANDARD.decode(value.as_bytes()).map_err(|e| {
        Error::new(ErrorKind::InvalidOperation, format!("invalid base64: {e}"))
    })?;
    String::from_utf8(decoded).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("decoded value is not UTF-8: {e}"),
        )
    })
}

fn sha256sum(value: String) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            message.unwrap_or_else(|| "a required value is missing".to_string()),
        ));
    }
    Ok(value)
}

fn now(format: Option<String>) -> String {
    let now = chrono::Utc::now();
    match format {
        Some(format) => now.format(&format).to_string(),
        None => now.to_rfc3339(),
    }
}

fn secret(
    lookup: &dyn SecretLookup,
    skip: bool,
    name: &str,
    key: Option<&str>,
) -> Result<String, Error> {
    if skip {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("secret '{name}' skipped"),
        )
        .with_source(SecretSkipped));
    }

    let value = lookup
        .secret_value(name)
        .map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("failed to read secret '{name}': {e:#}"),
            )
        })?
        .ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("secret '{name}' does not exist"),
            )
        })?;

    let Some(key) = key else {
        return Ok(value);
    };

    let fields: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&value)
        .map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("secret '{name}' is not a JSON object: {e}"),
            )
        })?;
    match fields.get(key) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("secret '{name}' has no key '{key}'"),
        )),
    }
}
