use crate::handle::IndexHandle;
use common::ids::{Iid, Rid};
use common::QuarryError;
use std::sync::Arc;

/// Cursor over the half-open index interval [lower, upper).
pub struct IxScan {
    handle: Arc<IndexHandle>,
    iid: Iid,
    end: Iid,
}

impl IxScan {
    pub fn new(handle: Arc<IndexHandle>, lower: Iid, upper: Iid) -> Self {
        IxScan {
            handle,
            iid: lower,
            end: upper,
        }
    }

    pub fn is_end(&self) -> bool {
        self.iid == self.end
    }

    /// The heap rid at the cursor.
    pub fn rid(&self) -> Result<Rid, QuarryError> {
        self.handle.get_rid(self.iid)
    }

    /// Advance one position, hopping to the next leaf at a boundary.
    pub fn next(&mut self) -> Result<(), QuarryError> {
        if self.is_end() {
            return Err(QuarryError::InternalError(String::from(
                "IxScan advanced past its end",
            )));
        }
        self.iid = self.handle.next_iid(self.iid)?;
        Ok(())
    }
}
