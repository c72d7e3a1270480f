//! Input validators shared by the services.
//!
//! Validators return the cleaned value on success and a human-readable
//! message on failure; services wrap the message in `ServiceError::Validation`.

pub const MAX_CONTENT_LEN: usize = 5000;
pub const MAX_SHORT_TEXT_LEN: usize = 200;
pub const MAX_ID_LEN: usize = 128;

pub const MIN_PAGE_SIZE: i64 = 1;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Trim `value` and check its length in characters is within `min..=max`.
pub fn validate_bounded_string(
    value: &str,
    field: &str,
    min: usize,
    max: usize,
) -> Result<String, String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        if min == 1 {
            return Err(format!("{field} is required"));
        }
        return Err(format!("{field} must be at least {min} characters"));
    }
    if len > max {
        return Err(format!("{field} must be at most {max} characters (got {len})"));
    }
    Ok(trimmed.to_string())
}

/// Validate an optional free-text field. Blank input becomes `None`.
pub fn validate_optional_text(
    value: Option<&str>,
    field: &str,
    max: usize,
) -> Result<Option<String>, String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => validate_bounded_string(v, field, 1, max).map(Some),
        None => Ok(None),
    }
}

/// Ids are opaque, but they must be non-empty, bounded and free of the list
/// separator and control characters.
pub fn validate_id(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} is required"));
    }
    if value.len() > MAX_ID_LEN {
        return Err(format!("{field} is too long"));
    }
    if value.chars().any(|c| c == ',' || c.is_control()) {
        return Err(format!("{field} contains invalid characters"));
    }
    Ok(())
}

/// Resolve a requested page size against the configured default and clamp it.
pub fn clamp_page_size(requested: Option<i64>, default: i64) -> i64 {
    requested
        .unwrap_or(default)
        .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

pub fn validate_offset(offset: Option<i64>) -> Result<i64, String> {
    match offset.unwrap_or(0) {
        n if n < 0 => Err(format!("offset must not be negative (got {n})")),
        n => Ok(n),
    }
}
