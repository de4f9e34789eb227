//! Snapshot codec for the fact log and inventory.
//!
//! A snapshot is serialized as:
//! - magic bytes and a version byte for forward compatibility
//! - a length-prefixed JSON body (compatible with existing serde attributes)
//! - a CRC32 checksum for corruption detection
//!
//! ```text
//! [magic: 4 bytes "DFCT"][version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```
//!
//! Every fact and item field survives a round trip, including
//! `inventory_item_id` and `source_fact_ids`.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::fact::{Fact, FactFilter};
use crate::inventory::{InventoryItem, ItemFilter};
use crate::storage::memory::{InMemoryFactStore, InMemoryInventoryStore};
use crate::storage::traits::{FactStore, InventoryStore, StorageError};

/// Current codec version.
const CODEC_VERSION: u8 = 1;

/// Magic bytes identifying a snapshot.
pub const MAGIC: [u8; 4] = *b"DFCT";

/// Reject unreasonably large bodies (256 MB).
const MAX_BODY_SIZE: usize = 256 * 1024 * 1024;

const HEADER_LEN: usize = MAGIC.len() + 1 + 4;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    facts: Vec<Fact>,
    items: Vec<InventoryItem>,
}

fn codec_err(message: impl Into<String>) -> StorageError {
    StorageError::SerializationError(message.into())
}

/// Serializes both stores into a checksummed snapshot.
///
/// # Errors
/// Returns a storage error if either store cannot be read or the body exceeds
/// the maximum size.
pub fn save(facts: &dyn FactStore, inventory: &dyn InventoryStore) -> Result<Vec<u8>, StorageError> {
    let all_items = ItemFilter {
        include_removed: true,
        ..ItemFilter::default()
    };
    let snapshot = Snapshot {
        facts: facts.get_facts(&FactFilter::default())?,
        items: inventory.get_items(&all_items)?,
    };

    let data = serde_json::to_vec(&snapshot).map_err(|e| codec_err(format!("serialization failed: {e}")))?;
    if data.len() > MAX_BODY_SIZE {
        return Err(codec_err(format!(
            "snapshot size {} exceeds maximum {MAX_BODY_SIZE}",
            data.len()
        )));
    }

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    #[allow(clippy::cast_possible_truncation)]
    let len = data.len() as u32;

    let mut out = Vec::with_capacity(HEADER_LEN + data.len() + 4);
    out.extend_from_slice(&MAGIC);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());

    tracing::debug!(
        facts = snapshot.facts.len(),
        items = snapshot.items.len(),
        bytes = out.len(),
        "saved snapshot"
    );
    Ok(out)
}

/// Rebuilds in-memory stores from a snapshot produced by [`save`].
///
/// # Errors
/// - Returns error if magic bytes or version do not match
/// - Returns error if the frame is truncated or the checksum fails (corruption detected)
/// - Returns error if deserialization fails or the stores reject the content
pub fn load(bytes: &[u8]) -> Result<(InMemoryFactStore, InMemoryInventoryStore), StorageError> {
    if bytes.len() < HEADER_LEN + 4 {
        return Err(codec_err(format!("snapshot truncated: {} bytes", bytes.len())));
    }
    if bytes[..4] != MAGIC {
        return Err(codec_err(format!(
            "invalid magic bytes: expected {MAGIC:?}, got {:?}",
            &bytes[..4]
        )));
    }
    if bytes[4] != CODEC_VERSION {
        return Err(codec_err(format!(
            "unsupported codec version: {} (expected {CODEC_VERSION})",
            bytes[4]
        )));
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[5..HEADER_LEN]);
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_BODY_SIZE {
        return Err(codec_err(format!("entry size {len} exceeds maximum {MAX_BODY_SIZE}")));
    }
    if bytes.len() != HEADER_LEN + len + 4 {
        return Err(codec_err(format!(
            "snapshot length mismatch: header says {len}, frame holds {}",
            bytes.len().saturating_sub(HEADER_LEN + 4)
        )));
    }

    let data = &bytes[HEADER_LEN..HEADER_LEN + len];
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[HEADER_LEN + len..]);
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(data);
    let computed_crc = hasher.finalize();
    if stored_crc != computed_crc {
        return Err(codec_err(format!(
            "CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x} (data corrupted)"
        )));
    }

    let snapshot: Snapshot =
        serde_json::from_slice(data).map_err(|e| codec_err(format!("deserialization failed: {e}")))?;
    Ok((
        InMemoryFactStore::from_facts(snapshot.facts)?,
        InMemoryInventoryStore::from_items(snapshot.items)?,
    ))
}
