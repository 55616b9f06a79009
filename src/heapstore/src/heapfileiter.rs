use crate::buffer_pool::BufferPool;
use common::ids::{ContainerId, PageId, Rid, TransactionId};
use std::collections::VecDeque;
use std::sync::Arc;

/// Rid-ordered iterator over every record in a container.
///
/// Pages are fetched through the buffer pool one at a time; each page's
/// records are buffered so the pin is released before values are yielded.
pub struct HeapFileIterator {
    container_id: ContainerId,
    #[allow(dead_code)]
    tid: TransactionId,
    bp: Arc<BufferPool>,
    next_pid: PageId,
    num_pages: PageId,
    buffered: VecDeque<(Rid, Vec<u8>)>,
}

impl HeapFileIterator {
    pub(crate) fn new(container_id: ContainerId, tid: TransactionId, bp: Arc<BufferPool>) -> Self {
        let num_pages = bp.num_pages(container_id).unwrap_or(0);
        HeapFileIterator {
            container_id,
            tid,
            bp,
            next_pid: 0,
            num_pages,
            buffered: VecDeque::new(),
        }
    }

    /// Pull the next page's records into the buffer. False when the file is
    /// exhausted.
    fn load_next_page(&mut self) -> bool {
        while self.next_pid < self.num_pages {
            let pid = self.next_pid;
            self.next_pid += 1;
            match self.bp.fetch_page(self.container_id, pid) {
                Ok(frame) => {
                    {
                        let page = frame.read().unwrap();
                        for (slot_id, value) in page.iter() {
                            self.buffered.push_back((Rid::new(pid, slot_id), value));
                        }
                    }
                    let _ = self.bp.unpin(self.container_id, pid, false);
                    if !self.buffered.is_empty() {
                        return true;
                    }
                }
                Err(e) => {
                    warn!("HeapFileIterator failed to fetch page {}: {}", pid, e);
                    return false;
                }
            }
        }
        false
    }
}

impl Iterator for HeapFileIterator {
    type Item = (Rid, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.load_next_page() {
            return None;
        }
        self.buffered.pop_front()
    }
}
