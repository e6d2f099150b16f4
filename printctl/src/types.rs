//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases for readability at call sites:
//!
//! - [`StudentId`]: student account identifier (owned by the upstream identity service)
//! - [`PrinterId`]: printer identifier (printers are managed elsewhere)
//! - [`DocumentId`]: uploaded document identifier
//! - [`PrintJobId`]: settled print job identifier
//! - [`TransactionId`]: wallet top-up transaction identifier
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use uuid::Uuid;

pub type StudentId = Uuid;
pub type PrinterId = Uuid;
pub type DocumentId = Uuid;
pub type PrintJobId = Uuid;
pub type TransactionId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id: Uuid = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }
}
