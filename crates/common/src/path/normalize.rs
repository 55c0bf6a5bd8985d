// Repository path canonicalization: separator unification, traversal rejection, 512 char max.

use thiserror::Error;

/// Maximum allowed path length in characters.
const MAX_PATH_CHARS: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path exceeds maximum length of {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("path contains directory traversal component: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NullByte,

    #[error("path contains invalid component: {0}")]
    InvalidComponent(String),
}

/// Normalize a repository-relative file path before it is used as a cache or
/// pending-log key.
///
/// Rules:
/// - Convert all separators to `/`
/// - Collapse consecutive `/` into one
/// - Strip leading and trailing `/`
/// - Reject `.` and `..` path components (traversal)
/// - Reject null bytes
/// - Reject empty paths
/// - Enforce max 512 character limit (after normalization)
///
/// File names are otherwise kept byte-for-byte: the backend stores files under
/// exactly the name it is given, so no Unicode folding happens here.
pub fn normalize_path(input: &str) -> Result<String, PathError> {
    if input.is_empty() {
        return Err(PathError::Empty);
    }

    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let unified = input.replace('\\', "/");
    let components: Vec<&str> = unified.split('/').filter(|s| !s.is_empty()).collect();

    if components.is_empty() {
        return Err(PathError::Empty);
    }

    for component in &components {
        if *component == "." || *component == ".." {
            return Err(PathError::Traversal((*component).to_string()));
        }
        if component.trim().is_empty() {
            return Err(PathError::InvalidComponent("(whitespace-only component)".to_string()));
        }
    }

    let result = components.join("/");

    if result.chars().count() > MAX_PATH_CHARS {
        return Err(PathError::TooLong);
    }

    Ok(result)
}
