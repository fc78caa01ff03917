//! Common utility functions used across the platform

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new UUID v4
pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

/// Mask sensitive data for logging
///
/// # Example
/// ```
/// use basalt_core::utils::mask_sensitive;
///
/// assert_eq!(mask_sensitive("supersecretpassword"), "supe***word");
/// assert_eq!(mask_sensitive("short"), "***");
/// ```
pub fn mask_sensitive(data: &str) -> String {
    // Counted in characters, not bytes; the edges must never split a
    // multi-byte sequence
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "***".to_string()
    } else {
        let lead: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{lead}***{tail}")
    }
}

/// Filesystem-safe timestamp slug (`20240131_094500`), used to key run
/// artifacts so repeated runs never collide.
pub fn timestamp_slug(when: DateTime<Utc>) -> String {
    when.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generate_id_is_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_mask_sensitive_short_values_fully_hidden() {
        assert_eq!(mask_sensitive(""), "***");
        assert_eq!(mask_sensitive("12345678"), "***");
    }

    #[test]
    fn test_mask_sensitive_long_values_keep_edges() {
        assert_eq!(mask_sensitive("abcdefghijkl"), "abcd***ijkl");
    }

    #[test]
    fn test_mask_sensitive_multibyte_values_keep_edges() {
        // A multi-byte character straddling the fourth byte must not panic
        assert_eq!(mask_sensitive("abcäxxxxx"), "abcä***xxxx");
        assert_eq!(mask_sensitive("müñchen-secret"), "müñc***cret");
        // Eight characters or fewer stay fully hidden, whatever their width
        assert_eq!(mask_sensitive("pässwörd"), "***");
    }

    #[test]
    fn test_timestamp_slug_format() {
        let when = Utc.with_ymd_and_hms(2024, 1, 31, 9, 45, 0).unwrap();
        assert_eq!(timestamp_slug(when), "20240131_094500");
    }

    #[test]
    fn test_timestamp_slug_zero_pads() {
        let when = Utc.with_ymd_and_hms(2025, 7, 4, 3, 5, 9).unwrap();
        assert_eq!(timestamp_slug(when), "20250704_030509");
    }
}
