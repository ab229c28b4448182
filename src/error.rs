//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Error type shared by all modules.
//!

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistestError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Shape mismatch{}: expected {expected:?}, got {actual:?}", context_suffix(.context))]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
        context: Option<String>
    },

    #[error("Unsupported method '{method}'; supported: {}", .supported.join(", "))]
    UnsupportedMethod {
        method: String,
        supported: Vec<&'static str>
    },

    #[error("Key '{key}' already exists in '{}'", .ledger.display())]
    DuplicateKey {
        key: String,
        ledger: PathBuf
    },

    #[error("Corrupt metadata ledger '{}': {source}", .path.display())]
    CorruptLedger {
        path: PathBuf,
        #[source]
        source: serde_json::Error
    },

    #[error("Storage error at '{}': {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error
    },

    #[error("The folder name '{0}' doesn't exist")]
    UnknownFolder(String),

    #[error("Parameters file not found: '{}'{}", .path.display(), template_suffix(.template))]
    ConfigNotFound {
        path: PathBuf,
        template: Option<PathBuf>
    },

    #[error("Invalid parameters file '{}': {reason}", .path.display())]
    ConfigInvalid {
        path: PathBuf,
        reason: String
    },

    #[error("Invalid command '{command}'; expected a comma-separated list of: {}", .supported.join(", "))]
    InvalidCommand {
        command: String,
        supported: Vec<&'static str>
    },

    #[error("Invalid image '{}': {reason}", .path.display())]
    InvalidImage {
        path: PathBuf,
        reason: String
    },

    #[error("Cannot render overlay '{}': {reason}", .path.display())]
    Render {
        path: PathBuf,
        reason: String
    },

    #[error("Processing cancelled before '{0}'")]
    Cancelled(String)
}

pub type Result<T> = std::result::Result<T, RegistestError>;

impl RegistestError {
    pub fn storage<P: Into<PathBuf>>(path: P, source: std::io::Error) -> RegistestError {
        RegistestError::Storage{ path: path.into(), source }
    }

    pub fn invalid_image<P: Into<PathBuf>, S: ToString>(path: P, reason: S) -> RegistestError {
        RegistestError::InvalidImage{ path: path.into(), reason: reason.to_string() }
    }
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(c) => format!(" for '{}'", c),
        None => String::new()
    }
}

fn template_suffix(template: &Option<PathBuf>) -> String {
    match template {
        Some(t) => format!("; a template was written to '{}'", t.display()),
        None => String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_message_names_key_and_ledger() {
        let err = RegistestError::DuplicateKey{
            key: "ref_target_0.tif".to_string(),
            ledger: PathBuf::from("/out/to_register/metadata.json")
        };
        let msg = err.to_string();
        assert!(msg.contains("ref_target_0.tif"));
        assert!(msg.contains("/out/to_register/metadata.json"));
    }

    #[test]
    fn unsupported_method_lists_supported_methods() {
        let err = RegistestError::UnsupportedMethod{
            method: "elastix".to_string(),
            supported: vec!["phase-correlation", "affine-optimization"]
        };
        assert_eq!(
            "Unsupported method 'elastix'; supported: phase-correlation, affine-optimization",
            err.to_string()
        );
    }

    #[test]
    fn shape_mismatch_mentions_context() {
        let err = RegistestError::ShapeMismatch{
            expected: [10, 10, 10],
            actual: [10, 12, 10],
            context: Some("shifted/a.tif".to_string())
        };
        let msg = err.to_string();
        assert!(msg.contains("shifted/a.tif"));
        assert!(msg.contains("[10, 12, 10]"));
    }

    #[test]
    fn storage_error_keeps_source() {
        use std::error::Error;

        let err = RegistestError::storage(
            "/read-only/out",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied")
        );
        assert!(err.to_string().contains("/read-only/out"));
        assert!(err.source().is_some());
    }

    #[test]
    fn config_not_found_mentions_template() {
        let err = RegistestError::ConfigNotFound{
            path: PathBuf::from("/work/parameters.json"),
            template: Some(PathBuf::from("/work/parameters_template.json"))
        };
        assert!(err.to_string().contains("/work/parameters_template.json"));
    }
}
