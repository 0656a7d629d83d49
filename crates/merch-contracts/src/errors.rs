use thiserror::Error;

/// Terminal failure of a studio request, grouped by origin so the admin can tell
/// a bad form apart from a missing key, an upstream failure, or a disk problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Provider(String),
    #[error("{0}")]
    Storage(String),
}

impl StudioError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Wraps an `anyhow` chain from a filesystem helper, keeping every cause.
    pub fn storage(context: &str, err: &anyhow::Error) -> Self {
        Self::Storage(format!("{context}: {err:#}"))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "configuration",
            Self::Provider(_) => "provider",
            Self::Storage(_) => "storage",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::Configuration(message)
            | Self::Provider(message)
            | Self::Storage(message) => message,
        }
    }
}

pub type StudioResult<T> = Result<T, StudioError>;

#[cfg(test)]
mod tests {
    use super::StudioError;

    #[test]
    fn storage_error_keeps_cause_chain() {
        let err = anyhow::anyhow!("permission denied").context("failed to write logo.png");
        let wrapped = StudioError::storage("Failed to save image", &err);
        assert_eq!(wrapped.kind(), "storage");
        assert_eq!(
            wrapped.message(),
            "Failed to save image: failed to write logo.png: permission denied"
        );
    }

    #[test]
    fn display_is_the_bare_message() {
        let err = StudioError::provider("Billing hard limit has been reached.");
        assert_eq!(err.to_string(), "Billing hard limit has been reached.");
        assert_eq!(err.kind(), "provider");
    }
}
