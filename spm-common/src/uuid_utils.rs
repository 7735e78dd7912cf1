//! Identifier utilities
//!
//! Rows written by the monitor (monitor records, synthesized study-plan items)
//! get client-side generated ids.

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new id in the string form stored in TEXT primary keys
pub fn generate_id() -> String {
    generate().to_string()
}

/// Parse UUID from string
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_and_parse() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(parse(&a).is_ok());
    }
}
