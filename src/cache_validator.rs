//! Integrity checks for cached lead payloads.
//!
//! Every cached result set is stored as a JSON string together with its
//! SHA-256 checksum. On read the checksum is recomputed; a mismatch or a
//! payload that no longer parses is reported as `None` so the caller
//! treats the entry as a cache miss and fetches fresh data.

use crate::models::Contact;
use sha2::{Digest, Sha256};

/// Serialized contact list plus its checksum, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLeads {
    /// JSON array of contacts.
    pub data: String,
    /// SHA-256 of `data`, hex encoded.
    pub checksum: String,
}

impl ValidatedLeads {
    pub fn encode(contacts: &[Contact]) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_string(contacts)?;
        let checksum = compute_checksum(&data);
        Ok(Self { data, checksum })
    }

    /// Parses a stored payload, returning `None` if it was corrupted or tampered with.
    pub fn decode(data: &str, checksum: &str) -> Option<Vec<Contact>> {
        if compute_checksum(data) != checksum {
            tracing::warn!(
                "Cached leads failed validation: checksum mismatch (expected {}, {} bytes)",
                checksum,
                data.len()
            );
            return None;
        }

        match serde_json::from_str::<Vec<Contact>>(data) {
            Ok(contacts) => Some(contacts),
            Err(e) => {
                tracing::warn!("Cached leads failed to parse: {}", e);
                None
            }
        }
    }
}

pub fn compute_checksum(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}
