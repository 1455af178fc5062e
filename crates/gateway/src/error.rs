use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway errors.
///
/// `ModelNotFound` and `ProviderNotFound` are configuration or lookup errors
/// and are never retried. `Api` covers everything that went wrong talking to a
/// vendor: non-2xx status, malformed body, transport failure, or an exhausted
/// retry budget.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Requested model is not registered under any provider.
    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// Requested provider has no registered adapter.
    #[error("provider '{0}' not found")]
    ProviderNotFound(String),

    /// The vendor call failed. `status` is set when the vendor answered with
    /// a non-2xx code, and absent for transport-level failures.
    #[error("provider API error: {message}")]
    Api { status: Option<u16>, message: String },

    /// A model name may only be claimed by one provider; registration of a
    /// second claimant is rejected.
    #[error("model '{model}' is already registered by provider '{existing_provider}'")]
    DuplicateModel { model: String, existing_provider: String },

    /// Every candidate in a failover chain failed. Embeds the last recorded
    /// underlying error; earlier failures are only logged.
    #[error("all candidate models failed{}", last_suffix(last.as_deref()))]
    AllCandidatesFailed { last: Option<Box<GatewayError>> },
}

fn last_suffix(last: Option<&GatewayError>) -> String {
    match last {
        Some(error) => format!("; last error: {error}"),
        None => String::new(),
    }
}

impl GatewayError {
    /// Transport-level API failure without an HTTP status.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
        }
    }

    /// API failure carrying the vendor's HTTP status code.
    pub fn api_status(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Lookup errors indicate caller or configuration problems and must
    /// propagate without retries.
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::ModelNotFound(_) | Self::ProviderNotFound(_))
    }
}
