use thiserror::Error;

/// Error type for application-context initialization.
#[derive(Error, Debug)]
pub enum InitContextError {
    /// Returned when a required component is missing from the context
    #[error("component not found: {0}")]
    ComponentNotFound(String),
    /// Returned when a primitive error occurs during staged init
    #[error("primitive error: {0}")]
    Primitive(String),
}
