use super::address::PA;

/// A contiguous range of physical memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhysMemoryRegion {
    start: PA,
    size: usize,
}

impl PhysMemoryRegion {
    pub const fn new(start: PA, size: usize) -> Self {
        Self { start, size }
    }

    /// Builds the region `[start, end)`. Returns `None` if `end < start`.
    pub fn from_bounds(start: PA, end: PA) -> Option<Self> {
        let size = end.value().checked_sub(start.value())?;
        Some(Self { start, size })
    }

    pub const fn start_address(self) -> PA {
        self.start
    }

    pub const fn end_address(self) -> PA {
        self.start.add_bytes(self.size)
    }

    pub const fn size(self) -> usize {
        self.size
    }

    /// Grows the region outwards to page boundaries.
    pub const fn page_align_outwards(self) -> Self {
        let start = self.start.page_aligned();
        let end = self.end_address().value();
        let end = (end + super::PAGE_MASK) & !super::PAGE_MASK;
        Self {
            start,
            size: end - start.value(),
        }
    }
}
