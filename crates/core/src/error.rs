use std::fmt;

use crate::gl::ResourceKind;

/// Result alias that carries the custom [`VizError`] type.
pub type Result<T> = std::result::Result<T, VizError>;

/// Common error type for the core crate.
///
/// [`VizError::Binding`] is the only transient variant. The remaining
/// contract variants indicate misuse of the API and are returned to the caller
/// instead of being logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum VizError {
    /// A native activation or deactivation call failed.
    #[error(transparent)]
    Binding(#[from] BindingError),
    /// A composite buffer object was handed a second child of the same role.
    #[error("{child} buffer has already been attached")]
    AlreadyInitialized { child: &'static str },
    /// The binding context was asked for a kind it was never configured with.
    #[error("no exclusivity group registered for resource kind {0:?}")]
    UnknownKind(ResourceKind),
    /// An operation that needs a native handle ran before `init`.
    #[error("{0} used before it was initialised")]
    UninitializedUse(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl VizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Whether the error is a transient native failure rather than misuse.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Binding(_))
    }
}

impl From<&str> for VizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Failure reported by a native bind or unbind call.
#[derive(thiserror::Error)]
#[error("binding failed: {message}")]
pub struct BindingError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BindingError {
    /// Creates a new error with no underlying cause.
    pub fn new<T: Into<String>>(message: T) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the lower level error that caused this failure.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingError")
            .field("message", &self.message)
            .field("source", &self.source.as_ref().map(|err| err.to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn binding_error_keeps_its_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "driver lost");
        let err = BindingError::with_source("glBindTexture", cause);

        assert_eq!(err.message(), "glBindTexture");
        assert_eq!(err.source().unwrap().to_string(), "driver lost");
    }

    #[test]
    fn only_binding_failures_are_transient() {
        let transient: VizError = BindingError::new("lost context").into();
        assert!(transient.is_transient());
        assert!(!VizError::UnknownKind(ResourceKind::Texture).is_transient());
        assert!(!VizError::AlreadyInitialized { child: "index" }.is_transient());
    }

    #[test]
    fn contract_errors_render_readable_messages() {
        let err = VizError::UninitializedUse("vertex array");
        assert_eq!(err.to_string(), "vertex array used before it was initialised");
    }
}
