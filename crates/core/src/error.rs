use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Trim and check a submitted description.
pub fn validate_description(description: &str) -> Result<String, CoreError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "A non-empty \"description\" field is required.".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
