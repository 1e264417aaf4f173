use crate::extension_system::error::ExtensionSystemError;
use crate::extension_system::slug::validate_slug;
use crate::kernel::constants::MAX_SLUG_LEN;

#[test]
fn accepts_typical_slugs() {
    for slug in ["gallery", "seo-toolkit", "my_plugin2", "A1", "a"] {
        assert!(validate_slug(slug).is_ok(), "expected '{slug}' to be valid");
    }
}

#[test]
fn rejects_empty_and_oversized() {
    assert!(validate_slug("").is_err());
    let long = "a".repeat(MAX_SLUG_LEN + 1);
    assert!(validate_slug(&long).is_err());
    let max = "a".repeat(MAX_SLUG_LEN);
    assert!(validate_slug(&max).is_ok());
}

#[test]
fn rejects_traversal_shapes() {
    for slug in [".", "..", "../etc", "a/../b", "a/b", "a\\b", "..hidden"] {
        let err = validate_slug(slug).expect_err(&format!("expected '{slug}' to be rejected"));
        assert!(matches!(err, ExtensionSystemError::InvalidSlug { .. }));
    }
}

#[test]
fn rejects_exotic_characters() {
    for slug in ["héllo", "my plugin", "a.b", "x;y", "emoji🎨"] {
        assert!(validate_slug(slug).is_err(), "expected '{slug}' to be rejected");
    }
}
