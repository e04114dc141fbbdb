//! Source text normalization and content hashing for memory lookups.
//! The digest is a dedup key, not a security boundary.

/// Trim surrounding whitespace and lowercase with Unicode case mapping.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Hex-encoded blake3 digest (64 chars) of the normalized text.
pub fn content_hash(text: &str) -> String {
    blake3::hash(normalize(text).as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_whitespace_collapse() {
        let h = content_hash("hola");
        assert_eq!(content_hash("Hola"), h);
        assert_eq!(content_hash("  HOLA  "), h);
        assert_eq!(content_hash("\tHoLa\n"), h);
    }

    #[test]
    fn multibyte_text_is_folded() {
        assert_eq!(content_hash("ÁRBOL"), content_hash("árbol"));
        assert_eq!(content_hash("ΣΟΦΙΑ"), content_hash("σοφια"));
        assert_ne!(content_hash("arbol"), content_hash("árbol"));
    }

    #[test]
    fn digest_is_fixed_length_hex() {
        for text in ["", "a", "a much longer sentence with punctuation!"] {
            let h = content_hash(text);
            assert_eq!(h.len(), 64);
            assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn digest_is_stable() {
        // Known blake3 digest of the empty string.
        assert_eq!(
            content_hash("   "),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn inner_whitespace_is_significant() {
        assert_ne!(content_hash("hola mundo"), content_hash("hola  mundo"));
    }
}
