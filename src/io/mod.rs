//! Import and export of nutrition data
pub mod json;

pub use json::{export, import, Document, ImportStats};
