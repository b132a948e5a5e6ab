//! Domain error types.

/// Top-level error type for rcitrader.
#[derive(Debug, thiserror::Error)]
pub enum RciTraderError {
    #[error("bar source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("order rejected: {reason}")]
    Order { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {series}")]
    NoData { series: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RciTraderError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        RciTraderError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors that must stop a live trading loop instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RciTraderError::InvalidState { .. } | RciTraderError::InvalidParameter { .. }
        )
    }
}

impl From<&RciTraderError> for std::process::ExitCode {
    fn from(err: &RciTraderError) -> Self {
        let code: u8 = match err {
            RciTraderError::Io(_) => 1,
            RciTraderError::ConfigParse { .. }
            | RciTraderError::ConfigMissing { .. }
            | RciTraderError::ConfigInvalid { .. } => 2,
            RciTraderError::SourceUnavailable { .. } => 3,
            RciTraderError::InvalidParameter { .. } | RciTraderError::InvalidState { .. } => 4,
            RciTraderError::NoData { .. } => 5,
            RciTraderError::Order { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
