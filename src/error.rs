use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("template validation failed: {0}")]
    TemplateValidation(String),
    #[error("resource error: {0}")]
    Resource(String),
    #[error("layout error: {0}")]
    Layout(String),
    #[error("security configuration error: {0}")]
    SecurityConfig(String),
    #[error("internal write error: {0}")]
    InternalWrite(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AssemblyError {
    fn from(value: serde_json::Error) -> Self {
        AssemblyError::TemplateValidation(format!("invalid template json: {value}"))
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_surface_as_validation() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: AssemblyError = err.into();
        assert!(matches!(err, AssemblyError::TemplateValidation(_)));
        assert!(err.to_string().starts_with("template validation failed"));
    }
}
