//! Error taxonomy for the archappl client library.

use thiserror::Error;

pub use crate::config::ConfigError;

/// Result type alias used throughout the library.
pub type Result<T> = std::result::Result<T, ArchiverError>;

#[derive(Debug, Error)]
pub enum ArchiverError {
    /// No usable configuration could be resolved, or it failed to parse.
    /// Raised before any network call is made.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Transport, HTTP or decode failure while talking to the appliance.
    #[error("data retrieval failed: {message}")]
    Retrieval {
        /// PV the request was about, when the request had a single subject.
        pv: Option<String>,
        message: String,
        /// HTTP status, when the failure happened after a response arrived.
        status: Option<u16>,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The appliance explicitly rejected the PV name.
    #[error("PV not known to the archiver: '{pv}'")]
    InvalidPv { pv: String },

    /// The appliance rejected a management operation for a PV.
    #[error("management operation '{op}' failed for '{pv}': {message}")]
    Management {
        op: String,
        pv: String,
        message: String,
    },

    /// The request was rejected client-side, before hitting the network.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Rendering retrieved data into an output format failed.
    #[error("output rendering failed: {0}")]
    Render(String),
}

impl ArchiverError {
    /// Creates a Retrieval error for a single-PV request.
    pub fn retrieval(pv: &str, message: impl Into<String>) -> Self {
        Self::Retrieval {
            pv: Some(pv.to_string()),
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Creates a Retrieval error carrying the HTTP status of the reply.
    pub fn retrieval_status(pv: Option<&str>, message: impl Into<String>, status: u16) -> Self {
        Self::Retrieval {
            pv: pv.map(str::to_owned),
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Wraps a transport-level reqwest failure.
    pub fn transport(pv: Option<&str>, source: reqwest::Error) -> Self {
        Self::Retrieval {
            pv: pv.map(str::to_owned),
            message: source.to_string(),
            status: source.status().map(|s| s.as_u16()),
            source: Some(source),
        }
    }

    /// Creates a Management error for one PV and operation.
    pub fn management(op: &str, pv: &str, message: impl Into<String>) -> Self {
        Self::Management {
            op: op.to_string(),
            pv: pv.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Returns the PV this error is about, if it has a single subject.
    pub fn pv(&self) -> Option<&str> {
        match self {
            Self::Retrieval { pv, .. } => pv.as_deref(),
            Self::InvalidPv { pv } => Some(pv),
            Self::Management { pv, .. } => Some(pv),
            _ => None,
        }
    }

    /// True if the server explicitly rejected the PV name.
    pub fn is_invalid_pv(&self) -> bool {
        matches!(self, Self::InvalidPv { .. })
    }

    /// True if the error was raised before any network traffic.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::InvalidRequest { .. } | Self::Render(_)
        )
    }
}
