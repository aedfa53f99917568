//! Address windows: where the ISA I/O-port and memory spaces sit in the
//! parent's physical address space.

use crate::loader::RangeEntry;
use crate::ofw::Space;

/// A contiguous span of the parent's address space, `base..=limit`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Window {
    base: u64,
    limit: u64,
}

impl Window {
    /// Window of `size` bytes at `base`.  A zero-sized window doesn't exist.
    pub fn new(base: u64, size: u64) -> Option<Self> {
        let last = size.checked_sub(1)?;
        Some(Self { base, limit: base.saturating_add(last) })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Last address in the window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn contains(&self, addr: u64) -> bool {
        (self.base..=self.limit).contains(&addr)
    }

    /// Child address to parent address, clamped to the window.
    pub fn to_parent(&self, child: u64) -> u64 {
        child.saturating_add(self.base).clamp(self.base, self.limit)
    }

    pub fn to_child(&self, parent: u64) -> u64 {
        parent.saturating_sub(self.base)
    }

    pub fn translate(&self, start: u64, end: u64) -> (u64, u64) {
        (self.to_parent(start), self.to_parent(end))
    }
}

/// The I/O-port and memory windows of a bridge.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Windows {
    pub io: Option<Window>,
    pub mem: Option<Window>,
}

impl Windows {
    /// Fold a range table into at most one window per space.  Rows are taken
    /// last to first, so the first row of a space wins.  Rows of other
    /// spaces and empty rows are skipped.
    pub fn fold(ranges: &[RangeEntry]) -> Self {
        let mut windows = Self::default();
        for range in ranges.iter().rev() {
            let slot = match range.space {
                Space::Io => &mut windows.io,
                Space::Mem32 => &mut windows.mem,
                Space::Config | Space::Mem64 => continue,
            };
            if let Some(window) = Window::new(range.base, range.size) {
                *slot = Some(window);
            }
        }
        windows
    }
}
