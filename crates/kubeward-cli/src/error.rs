//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use kubeward_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Manifest, path or option the user supplied is invalid
    #[error("Invalid input: {message}")]
    #[diagnostic(code(kubeward::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Objects reported error diagnostics
    #[error("{failed} of {total} object(s) failed")]
    #[diagnostic(
        code(kubeward::cli::reconcile),
        help("see the diagnostics above; rerun with --debug for the full trace")
    )]
    Reconcile { failed: usize, total: usize },

    /// Connecting to or talking with the cluster failed
    #[error("Cluster error: {message}")]
    #[diagnostic(code(kubeward::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Invalid configuration file
    #[error("Configuration error: {message}")]
    #[diagnostic(code(kubeward::cli::config))]
    Config { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(kubeward::cli::io))]
    Io { message: String },

    /// Anything else
    #[error("{message}")]
    #[diagnostic(code(kubeward::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::Reconcile { .. } => exit_codes::RECONCILE_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a reconcile failure error
    pub fn reconcile(failed: usize, total: usize) -> Self {
        Self::Reconcile { failed, total }
    }

    /// Create a cluster error
    pub fn cluster(message: impl Into<String>) -> Self {
        Self::Cluster {
            message: message.into(),
            help: Some(
                "check that a kubeconfig is available and the current context is reachable"
                    .to_string(),
            ),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Api(_) | KubeError::Store(_) => CliError::cluster(err.to_string()),
            KubeError::InvalidConfig(message) => CliError::Config { message },
            KubeError::Io(e) => CliError::from(e),
            KubeError::Core(_) | KubeError::Serialization(_) => CliError::input(err.to_string()),
            KubeError::RecordNotFound { .. } => CliError::input_with_help(
                err.to_string(),
                "the object is not managed yet; run `kubeward apply` or `kubeward adopt` first",
            ),
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::input("bad").exit_code(), exit_codes::INPUT_ERROR);
        assert_eq!(
            CliError::reconcile(1, 3).exit_code(),
            exit_codes::RECONCILE_ERROR
        );
        assert_eq!(
            CliError::from(KubeError::InvalidConfig("x".to_string())).exit_code(),
            exit_codes::CONFIG_ERROR
        );
    }

    #[test]
    fn test_record_not_found_has_help() {
        let err = CliError::from(KubeError::RecordNotFound {
            object: "ConfigMap default/cfg".to_string(),
        });
        match err {
            CliError::Input { help, .. } => assert!(help.unwrap().contains("kubeward adopt")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
