use common::ids::{PageId, SlotId};
use common::PAGE_SIZE;

/// Fixed header bytes: page_id (2) + slot count (2).
const HEADER_SIZE: usize = 4;
/// On-disk bytes per slot entry: slot_id (2) + offset (2) + length (2).
const SLOT_ENTRY_SIZE: usize = 6;

/// Metadata for one value stored in a page.
///
/// The slot id is the stable half of a record address; offsets may move
/// when the page compacts after a delete, but a (page, slot) pair never
/// changes while the record lives.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub slot_id: SlotId,
    pub offset: u16,
    pub length: u16,
}

/// Page header: fixed metadata plus the slot directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub page_id: PageId,
    /// Slot directory, kept sorted by slot_id.
    pub slots: Vec<Slot>,
}

/// A slotted page. Values are packed from the tail of the data array toward
/// the header; the slot directory grows from the front. Serializes to
/// exactly PAGE_SIZE bytes.
pub struct Page {
    pub header: Header,
    pub data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create an empty page with the given id.
    pub fn new(page_id: PageId) -> Self {
        Page {
            header: Header {
                page_id,
                slots: Vec::new(),
            },
            data: [0; PAGE_SIZE],
        }
    }

    pub fn get_page_id(&self) -> PageId {
        self.header.page_id
    }

    /// Start of the value region: the smallest value offset, or PAGE_SIZE
    /// on an empty page.
    fn value_region_start(&self) -> usize {
        self.header
            .slots
            .iter()
            .map(|s| s.offset as usize)
            .min()
            .unwrap_or(PAGE_SIZE)
    }

    /// Smallest slot id not currently in use. Freed ids are reused so slot
    /// numbers stay dense.
    fn next_slot_id(&self) -> SlotId {
        let mut id: SlotId = 0;
        for slot in &self.header.slots {
            if slot.slot_id != id {
                break;
            }
            id += 1;
        }
        id
    }

    /// Add a value to the page, returning its slot id, or None when the
    /// value does not fit.
    pub fn add_value(&mut self, value: &[u8]) -> Option<SlotId> {
        let needed_header = HEADER_SIZE + SLOT_ENTRY_SIZE * (self.header.slots.len() + 1);
        let region_start = self.value_region_start();
        if region_start < needed_header + value.len() {
            return None;
        }
        let offset = region_start - value.len();
        self.data[offset..offset + value.len()].copy_from_slice(value);
        let slot_id = self.next_slot_id();
        let slot = Slot {
            slot_id,
            offset: offset as u16,
            length: value.len() as u16,
        };
        let pos = self
            .header
            .slots
            .iter()
            .position(|s| s.slot_id > slot_id)
            .unwrap_or(self.header.slots.len());
        self.header.slots.insert(pos, slot);
        Some(slot_id)
    }

    /// Add a value at a specific free slot id. Used when transaction undo
    /// restores a deleted record at its original address.
    pub fn add_value_with_id(&mut self, slot_id: SlotId, value: &[u8]) -> Option<()> {
        if self.header.slots.iter().any(|s| s.slot_id == slot_id) {
            return None;
        }
        let needed_header = HEADER_SIZE + SLOT_ENTRY_SIZE * (self.header.slots.len() + 1);
        let region_start = self.value_region_start();
        if region_start < needed_header + value.len() {
            return None;
        }
        let offset = region_start - value.len();
        self.data[offset..offset + value.len()].copy_from_slice(value);
        let slot = Slot {
            slot_id,
            offset: offset as u16,
            length: value.len() as u16,
        };
        let pos = self
            .header
            .slots
            .iter()
            .position(|s| s.slot_id > slot_id)
            .unwrap_or(self.header.slots.len());
        self.header.slots.insert(pos, slot);
        Some(())
    }

    /// Read the value stored at a slot.
    pub fn get_value(&self, slot_id: SlotId) -> Option<Vec<u8>> {
        let slot = self.header.slots.iter().find(|s| s.slot_id == slot_id)?;
        let start = slot.offset as usize;
        Some(self.data[start..start + slot.length as usize].to_vec())
    }

    /// Overwrite the value at a slot in place. The record layout is fixed
    /// width, so the replacement must match the stored length.
    pub fn update_value(&mut self, slot_id: SlotId, value: &[u8]) -> Option<()> {
        let slot = self
            .header
            .slots
            .iter()
            .find(|s| s.slot_id == slot_id)?
            .clone();
        if slot.length as usize != value.len() {
            return None;
        }
        let start = slot.offset as usize;
        self.data[start..start + value.len()].copy_from_slice(value);
        Some(())
    }

    /// Delete the value at a slot and compact the value region so free
    /// space stays contiguous. Record addresses are unaffected: only byte
    /// offsets move, never slot ids.
    pub fn delete_value(&mut self, slot_id: SlotId) -> Option<()> {
        let pos = self
            .header
            .slots
            .iter()
            .position(|s| s.slot_id == slot_id)?;
        let removed = self.header.slots.remove(pos);
        let removed_off = removed.offset as usize;
        let removed_len = removed.length as usize;
        let region_start = self.value_region_start();
        if region_start < removed_off {
            self.data
                .copy_within(region_start..removed_off, region_start + removed_len);
        }
        for slot in self.header.slots.iter_mut() {
            if (slot.offset as usize) < removed_off {
                slot.offset += removed_len as u16;
            }
        }
        Some(())
    }

    /// Serialize the page into its PAGE_SIZE on-disk form.
    pub fn to_bytes(&self) -> [u8; PAGE_SIZE] {
        let mut buf = self.data;
        buf[0..2].copy_from_slice(&self.header.page_id.to_le_bytes());
        buf[2..4].copy_from_slice(&(self.header.slots.len() as u16).to_le_bytes());
        let mut pos = HEADER_SIZE;
        for slot in &self.header.slots {
            buf[pos..pos + 2].copy_from_slice(&slot.slot_id.to_le_bytes());
            buf[pos + 2..pos + 4].copy_from_slice(&slot.offset.to_le_bytes());
            buf[pos + 4..pos + 6].copy_from_slice(&slot.length.to_le_bytes());
            pos += SLOT_ENTRY_SIZE;
        }
        buf
    }

    /// Deserialize a page written by `to_bytes`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut page_data = [0u8; PAGE_SIZE];
        page_data.copy_from_slice(&data[..PAGE_SIZE]);
        let page_id = PageId::from_le_bytes([data[0], data[1]]);
        let num_slots = u16::from_le_bytes([data[2], data[3]]) as usize;
        let mut slots = Vec::with_capacity(num_slots);
        let mut pos = HEADER_SIZE;
        for _ in 0..num_slots {
            slots.push(Slot {
                slot_id: SlotId::from_le_bytes([data[pos], data[pos + 1]]),
                offset: u16::from_le_bytes([data[pos + 2], data[pos + 3]]),
                length: u16::from_le_bytes([data[pos + 4], data[pos + 5]]),
            });
            pos += SLOT_ENTRY_SIZE;
        }
        Page {
            header: Header { page_id, slots },
            data: page_data,
        }
    }

    /// Iterate the stored values in slot order.
    pub fn iter(&self) -> PageIter {
        let entries = self
            .header
            .slots
            .iter()
            .map(|s| (s.slot_id, self.get_value(s.slot_id).unwrap()))
            .collect();
        PageIter { entries, pos: 0 }
    }
}

/// Iterator over the (slot, value) pairs of a page.
pub struct PageIter {
    entries: Vec<(SlotId, Vec<u8>)>,
    pos: usize,
}

impl Iterator for PageIter {
    type Item = (SlotId, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.entries.get(self.pos).cloned();
        self.pos += 1;
        item
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bytes(n: usize, fill: u8) -> Vec<u8> {
        vec![fill; n]
    }

    #[test]
    fn test_add_get() {
        let mut p = Page::new(0);
        let v0 = bytes(10, 1);
        let v1 = bytes(20, 2);
        assert_eq!(Some(0), p.add_value(&v0));
        assert_eq!(Some(1), p.add_value(&v1));
        assert_eq!(Some(v0), p.get_value(0));
        assert_eq!(Some(v1), p.get_value(1));
        assert_eq!(None, p.get_value(2));
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut p = Page::new(7);
        p.add_value(&bytes(100, 3));
        p.add_value(&bytes(50, 4));
        let serialized = p.to_bytes();
        let check = Page::from_bytes(&serialized);
        assert_eq!(7, check.get_page_id());
        assert_eq!(p.get_value(0), check.get_value(0));
        assert_eq!(p.get_value(1), check.get_value(1));
        assert_eq!(serialized[..], check.to_bytes()[..]);
    }

    #[test]
    fn test_delete_reuses_slot_and_space() {
        let mut p = Page::new(0);
        p.add_value(&bytes(30, 1));
        p.add_value(&bytes(30, 2));
        p.add_value(&bytes(30, 3));
        assert!(p.delete_value(1).is_some());
        assert_eq!(None, p.get_value(1));
        // Surviving values are untouched.
        assert_eq!(Some(bytes(30, 1)), p.get_value(0));
        assert_eq!(Some(bytes(30, 3)), p.get_value(2));
        // The freed slot id is reused.
        assert_eq!(Some(1), p.add_value(&bytes(30, 4)));
        assert_eq!(Some(bytes(30, 4)), p.get_value(1));
    }

    #[test]
    fn test_update_in_place() {
        let mut p = Page::new(0);
        p.add_value(&bytes(16, 1));
        assert!(p.update_value(0, &bytes(16, 9)).is_some());
        assert_eq!(Some(bytes(16, 9)), p.get_value(0));
        // Length change is rejected.
        assert!(p.update_value(0, &bytes(8, 9)).is_none());
    }

    #[test]
    fn test_fill_page() {
        let mut p = Page::new(0);
        let v = bytes(100, 7);
        let mut added = 0;
        while p.add_value(&v).is_some() {
            added += 1;
        }
        // 100-byte values plus 6 bytes of slot metadata each.
        assert!(added >= (PAGE_SIZE - HEADER_SIZE) / (100 + SLOT_ENTRY_SIZE) - 1);
        // After deleting one, one more fits again.
        p.delete_value(3).unwrap();
        assert_eq!(Some(3), p.add_value(&v));
    }

    #[test]
    fn test_iter() {
        let mut p = Page::new(0);
        p.add_value(&bytes(10, 1));
        p.add_value(&bytes(10, 2));
        let collected: Vec<(SlotId, Vec<u8>)> = p.iter().collect();
        assert_eq!(2, collected.len());
        assert_eq!((0, bytes(10, 1)), collected[0]);
        assert_eq!((1, bytes(10, 2)), collected[1]);
    }
}
