//! Object key validation.

use super::{BucketError, BucketResult};

/// Maximum object key length in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// Validate an object key.
///
/// Keys are `/`-delimited paths without a leading slash. Empty, `.` and
/// `..` segments are rejected, as are control characters.
pub fn validate_key(key: &str) -> BucketResult<()> {
    if key.is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(invalid(&format!(
            "key is too long ({} bytes, maximum {})",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(invalid("key must not contain control characters"));
    }
    if key.starts_with('/') {
        return Err(invalid("key must not start with '/'"));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("key contains an empty or relative path segment"));
    }

    Ok(())
}

fn invalid(message: &str) -> BucketError {
    BucketError::InvalidInput(format!("invalid key: {}", message))
}
