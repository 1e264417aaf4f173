//! Slug validation.
//!
//! A slug is later joined verbatim onto the extensions root to form a
//! directory path, so this check is a security gate: anything that could
//! step outside the root (separators, traversal sequences) or surprise the
//! filesystem (exotic characters, unbounded length) is rejected outright.

use crate::extension_system::error::{ExtResult, ExtensionSystemError};
use crate::kernel::constants::MAX_SLUG_LEN;

/// Validate a slug for use as a path segment under the extensions root.
///
/// Accepts ASCII alphanumerics, `-` and `_`, up to [`MAX_SLUG_LEN`] bytes.
pub fn validate_slug(slug: &str) -> ExtResult<()> {
    if slug.is_empty() {
        return invalid(slug, "slug is empty");
    }
    if slug.len() > MAX_SLUG_LEN {
        return invalid(slug, "slug exceeds maximum length");
    }
    if slug == "." || slug == ".." || slug.contains("..") {
        return invalid(slug, "slug contains a path traversal sequence");
    }
    if slug.contains('/') || slug.contains('\\') {
        return invalid(slug, "slug contains a path separator");
    }
    if let Some(c) = slug
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return invalid(slug, &format!("slug contains forbidden character '{}'", c));
    }
    Ok(())
}

fn invalid(slug: &str, reason: &str) -> ExtResult<()> {
    Err(ExtensionSystemError::InvalidSlug {
        slug: slug.to_string(),
        reason: reason.to_string(),
    })
}
