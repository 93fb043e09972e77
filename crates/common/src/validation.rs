//! Validation helpers for startup configuration and client uploads

use anyhow::{anyhow, Result};
use std::path::Path;

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Default cap on a `/predict` request body (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Smallest accepted upload cap; anything lower cannot carry a real photo
pub const MIN_UPLOAD_BYTES: usize = 1024;

/// Largest accepted upload cap (256 MiB)
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Maximum number of ONNX Runtime intra-op threads
pub const MAX_INTRA_THREADS: usize = 256;

// ============================================================================
// Resource Files
// ============================================================================

/// Validate that a startup resource exists and is a regular file
pub fn validate_resource_file(path: &Path, field_name: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }

    let metadata = std::fs::metadata(path)
        .map_err(|e| anyhow!("{} '{}' is not accessible: {}", field_name, path.display(), e))?;

    if !metadata.is_file() {
        return Err(anyhow!(
            "{} '{}' is not a regular file",
            field_name,
            path.display()
        ));
    }

    Ok(())
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate value is within range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    if value < min || value > max {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

/// Validate the configured request body cap
pub fn validate_upload_limit(bytes: usize) -> Result<()> {
    validate_range(bytes, MIN_UPLOAD_BYTES, MAX_UPLOAD_BYTES, "MAX_UPLOAD_BYTES")
}

// ============================================================================
// Tests
// ============================================================================
