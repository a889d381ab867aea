use serde::Serialize;

/// Crate-wide error type for fatal, IO, and configuration-level failures.
///
/// Per-item Provider errors use their own taxonomy (see [`crate::provider::ProviderError`])
/// because they drive distinct scheduler behavior instead of aborting the run.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("platform not found: {0}")]
    PlatformNotFound(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Whether an [`AppError`] should abort the run (poisons the cancel flag, §7).
impl AppError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Auth(_) | AppError::Config(_) | AppError::PlatformNotFound(_)
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
