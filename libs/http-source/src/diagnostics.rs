//! Diagnostics returned next to the state of every surface operation.
//!
//! Surface operations never fail with an error value: a failure becomes an
//! error entry and the state is left empty, a soft problem becomes a warning
//! next to a populated state.

use crate::error::{ConfigBlock, HttpError};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Warning attached when the response body is not valid UTF-8.
    #[must_use]
    pub fn non_utf8_body() -> Self {
        Self::warning(
            "Response body is not recognized as UTF-8",
            "The response_body may not be handled properly if the contents are binary; \
             use response_body_base64 instead.",
        )
    }
}

impl From<&HttpError> for Diagnostic {
    fn from(err: &HttpError) -> Self {
        Self::error(summary_for(err), detail_for(err))
    }
}

/// Which pipeline stage an error belongs to.
fn summary_for(err: &HttpError) -> &'static str {
    match err {
        HttpError::Tls(_)
        | HttpError::InvalidConfig {
            block: ConfigBlock::Tls,
            ..
        } => "Error configuring TLS client",
        HttpError::Body(_) => "Error reading response body",
        e if e.is_configuration() => "Error creating request",
        _ => "Error making request",
    }
}

/// Error message followed by any causes it does not already mention.
fn detail_for(err: &HttpError) -> String {
    let mut detail = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !detail.contains(&text) {
            detail.push_str(": ");
            detail.push_str(&text);
        }
        source = cause.source();
    }
    detail
}

/// Ordered list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn add_error(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Diagnostic::error(summary, detail));
    }

    pub fn add_warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Diagnostic::warning(summary, detail));
    }

    /// Records `err` as an error entry.
    pub fn add_http_error(&mut self, err: &HttpError) {
        self.push(Diagnostic::from(err));
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

impl From<&HttpError> for Diagnostics {
    fn from(err: &HttpError) -> Self {
        let mut diagnostics = Self::new();
        diagnostics.add_http_error(err);
        diagnostics
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// State produced by a surface operation and the diagnostics raised on the way.
///
/// `state` is `None` whenever `diagnostics` holds an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome<T> {
    pub state: Option<T>,
    pub diagnostics: Diagnostics,
}

impl<T> Outcome<T> {
    pub fn ok(state: T, diagnostics: Diagnostics) -> Self {
        Self {
            state: Some(state),
            diagnostics,
        }
    }

    pub fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.diagnostics.has_error()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            state: self.state.map(f),
            diagnostics: self.diagnostics,
        }
    }
}
