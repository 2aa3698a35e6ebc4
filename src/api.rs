use crate::ast::Document;
use crate::config::LoadConfig;
use crate::database::Database;
use crate::diagnostics::{Diagnostic, Severity};
use crate::error::{ConfigError, DefineError};
use crate::parser::Parser;
use serde::Serialize;
use std::path::Path;

/// Summary of one [`load`] call.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    /// Definitions registered by this load.
    pub loaded: usize,
    /// Everything reported while loading, in order.
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Parses every `(file_name, source)` pair and loads them into `database` in
/// one session.
///
/// Markup errors are fatal and returned before the session starts, so a
/// broken file leaves the database untouched. Problems inside well formed
/// documents are soft and end up in the report.
///
/// # Errors
/// Returns a [`DefineError`] when a document does not parse or a session is
/// already running.
pub fn load(
    database: &mut Database,
    sources: &[(&str, &str)],
    config: LoadConfig,
) -> Result<LoadReport, DefineError> {
    let documents = sources
        .iter()
        .map(|(name, source)| {
            let mut parser = Parser::new_with_name(source, (*name).to_string());
            parser.parse_document().map(|doc| (*name, doc))
        })
        .collect::<Result<Vec<(&str, Document)>, _>>()?;

    let before = database.diagnostics().all().len();
    database.start_loading(config, false)?;
    for (name, document) in &documents {
        database.add_document(document, name)?;
    }
    let loaded = database.finish_loading()?;

    let diagnostics = database.diagnostics().all().split_off(before);
    Ok(LoadReport { loaded, diagnostics })
}

/// Reads the files and calls [`load`].
///
/// # Errors
/// Returns a [`DefineError`] when a file cannot be read, a document does not
/// parse or a session is already running.
pub fn load_files<P: AsRef<Path>>(
    database: &mut Database,
    paths: &[P],
    config: LoadConfig,
) -> Result<LoadReport, DefineError> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        sources.push((path.to_string_lossy().to_string(), text));
    }
    let borrowed: Vec<(&str, &str)> = sources
        .iter()
        .map(|(name, text)| (name.as_str(), text.as_str()))
        .collect();
    load(database, &borrowed, config)
}
