pub mod api;
pub mod ast;
pub mod config;
pub mod context;
pub mod converter;
pub mod database;
pub mod diagnostics;
pub mod error;
pub mod inheritance;
pub mod lexer;
pub mod loader;
pub mod materialize;
pub mod members;
pub mod parser;
pub mod schema;
pub mod type_resolver;
pub mod types;
pub mod utils;
pub mod value;
mod serialization;

pub use api::{load, load_files, LoadReport};
pub use config::LoadConfig;
pub use database::{Database, Definition};
pub use error::DefineError;
pub use serialization::Value as ExportValue;
