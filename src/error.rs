/// Error taxonomy for workload operations
use thiserror::Error;

/// Result type for workload operations
pub type Result<T> = std::result::Result<T, WorkloadError>;

/// Errors that can occur while resolving configuration or talking to the API server
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// Required configuration key absent or blank
    #[error("Required configuration {0} is missing")]
    MissingConfiguration(String),

    /// Configuration value present but unusable
    #[error("Invalid value for {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    /// Config file could not be parsed
    #[error("Invalid config file {location}: {reason}")]
    InvalidConfigFile { location: String, reason: String },

    /// Neither fetchable remotely nor present on disk
    #[error("Resource unreachable and no local file: {0}")]
    ResourceUnreachable(String),

    /// Local file exists but could not be read
    #[error("Failed to read {location}: {source}")]
    ReadFailed {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not a parseable document
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Manifest kind other than Deployment or StatefulSet
    #[error("Only Deployment or StatefulSet supported. Found kind={kind}")]
    UnsupportedKind { kind: String },

    /// Both candidate collections answered 404
    #[error("Resource '{name}' not found as Deployment or StatefulSet in namespace '{namespace}'")]
    ResourceNotFound { name: String, namespace: String },

    /// Non-2xx response from the API server
    #[error("{action} failed{target}: {status} - {body}")]
    Api {
        action: String,
        target: String,
        status: u16,
        body: String,
    },

    /// SCALE_COUNT is not a non-negative integer
    #[error("Invalid SCALE_COUNT '{0}': expected a non-negative integer")]
    InvalidReplicaCount(String),

    /// Connection refused, timeout, TLS failure and the like
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl WorkloadError {
    /// Whether this error is the reported result of an attempted operation
    /// rather than a fatal problem that prevented the attempt.
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedKind { .. }
                | Self::ResourceNotFound { .. }
                | Self::Api { .. }
                | Self::Transport { .. }
        )
    }
}
