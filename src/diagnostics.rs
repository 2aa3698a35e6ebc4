//! The diagnostic channel.
//!
//! Loading never stops on the first problem. Every soft failure becomes a
//! [`Diagnostic`] that is recorded, forwarded to any registered listeners and
//! mirrored to the `log` facade. The caller decides what to do with them.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Display text of the underlying error chain, if any.
    pub cause: Option<String>,
    /// Path of the markup node being processed, e.g. `Sword/Stats/li[2]`.
    pub path: Option<String>,
    /// ID of the definition being processed.
    pub definition: Option<String>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            cause: None,
            path: None,
            definition: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            ..Diagnostic::warning(message)
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: &(dyn std::error::Error + 'static)) -> Self {
        self.cause = Some(error_chain(cause));
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_definition(mut self, definition: Option<&str>) -> Self {
        self.definition = definition.map(str::to_string);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(def) = &self.definition {
            write!(f, "[{}] ", def)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(path) = &self.path {
            write!(f, " (at {})", path)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

type Listener = Box<dyn Fn(&Diagnostic)>;

/// Single-threaded sink for warnings and errors.
///
/// Listeners must not register further listeners while being notified.
#[derive(Default)]
pub struct Diagnostics {
    records: RefCell<Vec<Diagnostic>>,
    warning_listeners: RefCell<Vec<Listener>>,
    error_listeners: RefCell<Vec<Listener>>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("records", &self.records.borrow())
            .finish_non_exhaustive()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_warning(&self, listener: impl Fn(&Diagnostic) + 'static) {
        self.warning_listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn on_error(&self, listener: impl Fn(&Diagnostic) + 'static) {
        self.error_listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.report(Diagnostic::warning(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.report(Diagnostic::error(message));
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => {
                log::warn!("{}", diagnostic);
                for listener in self.warning_listeners.borrow().iter() {
                    listener(&diagnostic);
                }
            }
            Severity::Error => {
                log::error!("{}", diagnostic);
                for listener in self.error_listeners.borrow().iter() {
                    listener(&diagnostic);
                }
            }
        }
        self.records.borrow_mut().push(diagnostic);
    }

    /// Every recorded diagnostic, oldest first.
    pub fn all(&self) -> Vec<Diagnostic> {
        self.records.borrow().clone()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.filtered(Severity::Error)
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.filtered(Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Drops recorded diagnostics. Listeners stay registered.
    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }

    fn filtered(&self, severity: Severity) -> Vec<Diagnostic> {
        self.records
            .borrow()
            .iter()
            .filter(|d| d.severity == severity)
            .cloned()
            .collect()
    }

    fn count(&self, severity: Severity) -> usize {
        self.records
            .borrow()
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Handed to validation hooks. Messages are attributed to the definition
/// currently being validated.
pub struct ConfigReporter<'a> {
    diagnostics: &'a Diagnostics,
    current: Option<String>,
}

impl<'a> ConfigReporter<'a> {
    pub fn new(diagnostics: &'a Diagnostics) -> Self {
        ConfigReporter {
            diagnostics,
            current: None,
        }
    }

    pub fn current_definition(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub(crate) fn set_current(&mut self, definition: Option<String>) {
        self.current = definition;
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.diagnostics
            .report(Diagnostic::warning(message).with_definition(self.current_definition()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.diagnostics
            .report(Diagnostic::error(message).with_definition(self.current_definition()));
    }

    pub fn error_with(
        &self,
        message: impl Into<String>,
        cause: &(dyn std::error::Error + 'static),
    ) {
        self.diagnostics.report(
            Diagnostic::error(message)
                .with_cause(cause)
                .with_definition(self.current_definition()),
        );
    }

    /// Reports an error when `condition` is false. Returns `condition`.
    pub fn assert(&self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.error(format!("Assert failed: {}", message.into()));
        }
        condition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_records_and_counts() {
        let diagnostics = Diagnostics::new();
        diagnostics.warn("careful");
        diagnostics.error("broken");
        diagnostics.error("also broken");
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.error_count(), 2);
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.errors()[1].message, "also broken");

        diagnostics.clear();
        assert!(diagnostics.all().is_empty());
    }

    #[test]
    fn test_listeners_are_split_by_severity() {
        let diagnostics = Diagnostics::new();
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let errors = Rc::new(RefCell::new(Vec::new()));
        let w = warnings.clone();
        diagnostics.on_warning(move |d| w.borrow_mut().push(d.message.clone()));
        let e = errors.clone();
        diagnostics.on_error(move |d| e.borrow_mut().push(d.to_string()));

        diagnostics.warn("w1");
        diagnostics.report(Diagnostic::error("e1").with_path("A/B"));

        assert_eq!(*warnings.borrow(), vec!["w1".to_string()]);
        assert_eq!(*errors.borrow(), vec!["e1 (at A/B)".to_string()]);
    }

    #[test]
    fn test_reporter_prefixes_definition() {
        let diagnostics = Diagnostics::new();
        let mut reporter = ConfigReporter::new(&diagnostics);
        reporter.set_current(Some("Sword".to_string()));
        assert!(!reporter.assert(false, "math"));
        assert!(reporter.assert(true, "fine"));
        let errors = diagnostics.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "[Sword] Assert failed: math");
    }

    #[test]
    fn test_cause_chain() {
        let inner = crate::error::ResolveError::NotFound {
            name: "Foo".to_string(),
        };
        let d = Diagnostic::error("outer").with_cause(&inner);
        assert_eq!(d.cause.as_deref(), Some("Failed to find a type called 'Foo'"));
    }
}
