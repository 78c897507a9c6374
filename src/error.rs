//! Structured error types for config loading, env resolution and execution.

use std::fmt;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Loading errors
    ConfigError,
    EnvError,

    // Lookup errors
    TargetNotFound,
    DependencyCycle,

    // Run errors
    ExecutionError,
    RemoteConnectError,

    // Internal errors
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::EnvError => "ENV_ERROR",
            ErrorCode::TargetNotFound => "TARGET_NOT_FOUND",
            ErrorCode::DependencyCycle => "DEPENDENCY_CYCLE",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::RemoteConnectError => "REMOTE_CONNECT_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(s)
    }
}

/// A failure on one host of a remote fan-out.
#[derive(Debug)]
pub struct HostFailure {
    pub host: String,
    pub error: RonError,
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.host, self.error)
    }
}

#[derive(Debug, Error)]
pub enum RonError {
    /// Local read failure or HTTP transport failure for a config source.
    #[error("{path}: {message}")]
    Fetch { path: String, message: String },

    /// Non-200 response while fetching a config source.
    #[error("{path}: {status} {body}")]
    HttpStatus {
        path: String,
        status: u16,
        body: String,
    },

    #[error("{0}: empty file requires envs and target keys")]
    EmptyDocument(String),

    /// YAML syntax error annotated with the surrounding source lines.
    #[error("{path} {message}\n{context}")]
    Yaml {
        path: String,
        message: String,
        context: String,
    },

    #[error("{path}: template error: {message}")]
    Template { path: String, message: String },

    #[error("envs: {0}")]
    EnvYaml(String),

    /// A `+` env command failed.
    #[error("env {key}: {message}")]
    EnvCommand { key: String, message: String },

    #[error("{0} target not found")]
    TargetNotFound(String),

    #[error("{target} exited with status {status}")]
    Execution { target: String, status: i32 },

    #[error("{host}: unable to connect: {message}")]
    RemoteConnect { host: String, message: String },

    #[error("dependency cycle: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("{} remote host(s) failed: {}", .0.len(), join_failures(.0))]
    RemoteHosts(Vec<HostFailure>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join_failures(failures: &[HostFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl RonError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RonError::Fetch { .. }
            | RonError::HttpStatus { .. }
            | RonError::EmptyDocument(_)
            | RonError::Yaml { .. }
            | RonError::Template { .. } => ErrorCode::ConfigError,
            RonError::EnvYaml(_) | RonError::EnvCommand { .. } => ErrorCode::EnvError,
            RonError::TargetNotFound(_) => ErrorCode::TargetNotFound,
            RonError::Cycle { .. } => ErrorCode::DependencyCycle,
            RonError::Execution { .. } | RonError::RemoteHosts(_) => ErrorCode::ExecutionError,
            RonError::RemoteConnect { .. } => ErrorCode::RemoteConnectError,
            RonError::Io(_) => ErrorCode::InternalError,
        }
    }

    /// Process exit status to report for this error.
    ///
    /// Execution failures carry the real status of the failing command;
    /// everything else maps to 1.
    pub fn exit_status(&self) -> i32 {
        match self {
            RonError::Execution { status, .. } if *status != 0 => *status,
            _ => 1,
        }
    }

    pub fn remote_connect(host: &str, err: impl fmt::Display) -> Self {
        RonError::RemoteConnect {
            host: host.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for loader, resolver and executor operations.
pub type Result<T> = std::result::Result<T, RonError>;
