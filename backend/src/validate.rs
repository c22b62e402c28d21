//! Submission-time image validation.
//!
//! Validation failures are resolved at the gateway boundary and never reach
//! the worker pool: a rejected file is excluded from the envelope entirely.

/// Why an uploaded file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing filename")]
    MissingFilename,
    #[error("file extension not allowed")]
    DisallowedExtension,
    #[error("duplicate filename in submission")]
    DuplicateName,
    #[error("file exceeds maximum size")]
    TooLarge,
    #[error("corrupt or undecodable image: {0}")]
    Undecodable(String),
}

/// The classic allowed-file check: a dot, then an allowed suffix.
pub fn allowed_file(filename: &str, allowed: &[String]) -> bool {
    filename
        .rsplit_once('.')
        .map(|(stem, ext)| !stem.is_empty() && allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Validate one uploaded file: extension allow-list, size cap, then a real
/// decode so corrupt bytes are caught before they ever reach a worker.
pub fn validate_image(
    filename: &str,
    bytes: &[u8],
    allowed: &[String],
    max_bytes: usize,
) -> Result<(), ValidationError> {
    if filename.is_empty() {
        return Err(ValidationError::MissingFilename);
    }
    if !allowed_file(filename, allowed) {
        return Err(ValidationError::DisallowedExtension);
    }
    if max_bytes > 0 && bytes.len() > max_bytes {
        return Err(ValidationError::TooLarge);
    }
    image::load_from_memory(bytes)
        .map(|_| ())
        .map_err(|e| ValidationError::Undecodable(e.to_string()))
}
