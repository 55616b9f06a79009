use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

static TXN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Implementation of transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId {
    /// Id of transaction.
    id: u64,
}

impl TransactionId {
    /// Creates a new transaction id.
    pub fn new() -> Self {
        Self {
            id: TXN_COUNTER.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Returns the transaction id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        TransactionId::new()
    }
}

/// The type for the container ID and the associated atomic type.
/// ContainerIds identify the separate heap and index files managed by the
/// storage layer; the catalog tracks which container belongs to which
/// table or index.
pub type ContainerId = u16;
pub type AtomicContainerId = AtomicU16;
pub type PageId = u16;
pub type SlotId = u16;

/// Log sequence number.
pub type Lsn = u64;
pub const INVALID_LSN: Lsn = u64::MAX;

/// Sentinel for "no page" in page-linked structures.
pub const NO_PAGE: PageId = PageId::MAX;

/// Serialized width of a `Rid` inside index pages.
pub const RID_SIZE: usize = 4;

/// Address of a record in a heap file as (page, slot).
///
/// Records are never relocated: a rid stays valid until the record is
/// deleted.
#[derive(PartialEq, Clone, Copy, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl Rid {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }

    /// Fixed 4-byte encoding used inside index leaf pages.
    pub fn to_bytes(self) -> [u8; RID_SIZE] {
        let mut buf = [0u8; RID_SIZE];
        buf[0..2].copy_from_slice(&self.page_id.to_le_bytes());
        buf[2..4].copy_from_slice(&self.slot_id.to_le_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            page_id: PageId::from_le_bytes([data[0], data[1]]),
            slot_id: SlotId::from_le_bytes([data[2], data[3]]),
        }
    }
}

/// Position inside a B+-tree viewed as an ordered sequence of
/// leaves x slots. Not a record address; `slot_id` may equal the key count
/// of the last leaf to encode the past-the-end position.
#[derive(PartialEq, Clone, Copy, Eq, Debug)]
pub struct Iid {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl Iid {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rid_round_trip() {
        let rid = Rid::new(513, 7);
        assert_eq!(rid, Rid::from_bytes(&rid.to_bytes()));
    }

    #[test]
    fn test_txn_ids_unique() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a.id(), b.id());
    }
}
