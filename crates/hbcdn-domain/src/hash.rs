//! Hash helpers shared by the catalog and the exporters.

use md5::{Digest, Md5};
use serde_json::Value;

use crate::json_ascii;

#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut digest = Md5::new();
    digest.update(bytes);
    hex::encode(digest.finalize())
}

/// MD5 of the canonical JSON projection of `value`.
///
/// Canonical form sorts keys, escapes to ASCII, and uses compact separators,
/// so the digest is stable across runs and processes.
#[must_use]
pub fn canonical_md5(value: &Value) -> String {
    md5_hex(json_ascii::to_string_compact(value).as_bytes())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn md5_matches_known_vector() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn canonical_md5_is_key_order_independent() {
        let a = json!({"b": 1, "a": "x"});
        let b = json!({"a": "x", "b": 1});
        assert_eq!(canonical_md5(&a), canonical_md5(&b));
    }

    #[test]
    fn canonical_md5_distinguishes_values() {
        assert_ne!(
            canonical_md5(&json!({"a": 1})),
            canonical_md5(&json!({"a": 2}))
        );
    }
}
