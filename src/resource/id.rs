//! Composite identifiers for resources keyed by more than one remote value.

use super::ResourceError;

/// Separator between the parts of a composite identifier.
pub const ID_SEPARATOR: char = '#';

/// Joins identifier parts with [`ID_SEPARATOR`].
#[must_use]
pub fn join_id(parts: &[&str]) -> String {
    parts.join(&ID_SEPARATOR.to_string())
}

/// Splits `id` into exactly `N` non-empty parts.
///
/// # Errors
///
/// Returns [`ResourceError::MalformedId`] when the part count differs or a
/// part is empty.
pub fn split_id<const N: usize>(
    resource: &'static str,
    id: &str,
) -> Result<[String; N], ResourceError> {
    let malformed = || ResourceError::MalformedId {
        resource,
        id: id.to_owned(),
        parts: N,
    };
    let parts: Vec<String> = id.split(ID_SEPARATOR).map(str::to_owned).collect();
    if parts.iter().any(String::is_empty) {
        return Err(malformed());
    }
    <[String; N]>::try_from(parts).map_err(|_| malformed())
}
