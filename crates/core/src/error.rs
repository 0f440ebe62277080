/// Result alias that carries the custom [`MaestroError`] type.
pub type Result<T> = std::result::Result<T, MaestroError>;

/// Error type for the fallible edges of the orchestration core.
///
/// The bus, scheduler and state store never fail during normal operation;
/// these variants cover configuration, serialization and shared-lock access.
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// A configuration value is outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A shared component's lock was poisoned by a panicking holder.
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialization errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl MaestroError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid_config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<&str> for MaestroError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for MaestroError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
