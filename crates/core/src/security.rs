//! Input hardening: XML nesting limits, binary payload limits, archive path guards.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SecurityError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Maximum size of a single decoded binary payload in bytes.
    pub max_resource_size_bytes: u64,
    /// Maximum XML nesting depth.
    pub max_nesting_depth: u32,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_resource_size_bytes: 200 * 1024 * 1024, // 200 MB
            max_nesting_depth: 512,
        }
    }
}

/// Check an archive entry path for path traversal.
/// Returns an error if the path contains `..` components or is absolute.
pub fn check_path_traversal(entry_path: &str) -> Result<(), SecurityError> {
    if entry_path.starts_with('/') || entry_path.starts_with('\\') {
        return Err(SecurityError::PathTraversal {
            path: entry_path.to_string(),
        });
    }

    // Windows absolute paths (e.g., C:\)
    if entry_path.len() >= 2 && entry_path.as_bytes()[1] == b':' {
        return Err(SecurityError::PathTraversal {
            path: entry_path.to_string(),
        });
    }

    for component in Path::new(entry_path).components() {
        if let std::path::Component::ParentDir = component {
            return Err(SecurityError::PathTraversal {
                path: entry_path.to_string(),
            });
        }
    }

    Ok(())
}

/// Check if a single decoded payload exceeds the size limit.
pub fn check_resource_size(
    name: &str,
    size_bytes: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if size_bytes > limits.max_resource_size_bytes {
        return Err(SecurityError::OversizedResource {
            name: name.to_string(),
            size_mb: size_bytes / (1024 * 1024),
            limit_mb: limits.max_resource_size_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

/// Check if XML nesting depth exceeds the limit.
pub fn check_nesting_depth(depth: u32, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if depth > limits.max_nesting_depth {
        return Err(SecurityError::ExcessiveNesting {
            depth,
            limit: limits.max_nesting_depth,
        });
    }
    Ok(())
}
