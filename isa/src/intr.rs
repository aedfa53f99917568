//! Interrupt routing.  ISA lines are wired through the bridge to whatever
//! the platform's interrupt controller calls them (the INO).  Firmware
//! describes the wiring with an `interrupt-map` keyed on the bridge's unit
//! address and the line number.

use crate::ofw::{ImapEntry, ImapMask, PciRegister};
use alloc::vec::Vec;

/// Number of legacy ISA interrupt lines routed through the bridge.
pub const ISA_NLINES: usize = 8;

/// INO firmware uses for "not connected".
pub const INTR_UNMAPPED: u32 = 255;

#[derive(Clone, Debug)]
pub struct InterruptMap {
    entries: Vec<ImapEntry>,
    mask: ImapMask,
}

impl InterruptMap {
    pub fn new(entries: Vec<ImapEntry>, mask: ImapMask) -> Self {
        Self { entries, mask }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// INO for interrupt `intr` of the device whose unit address is `reg`.
    /// The first entry matching under the mask wins.
    pub fn route(&self, reg: &PciRegister, intr: u32) -> Option<u32> {
        let [hi, mid, lo] = reg.address();
        let key = self.mask.apply([hi, mid, lo, intr]);
        self.entries
            .iter()
            .find(|e| self.mask.apply(e.key()) == key)
            .map(|e| e.parent_intr.get())
            .filter(|&ino| ino != INTR_UNMAPPED)
    }
}

/// The INO of each legacy line, resolved once when the bus attaches.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LegacyIrqTable([Option<u32>; ISA_NLINES]);

impl LegacyIrqTable {
    pub fn new(imap: &InterruptMap, reg: &PciRegister) -> Self {
        Self(core::array::from_fn(|line| imap.route(reg, line as u32)))
    }

    pub fn ino(&self, line: usize) -> Option<u32> {
        self.0.get(line).copied().flatten()
    }

    /// Fold the pending state of each mapped line into a mask, line 0 in
    /// bit 0.  Unmapped lines are never pending.
    pub fn pending(&self, mut is_pending: impl FnMut(u32) -> bool) -> u8 {
        self.0.iter().rev().fold(0, |acc, ino| (acc << 1) | u8::from(ino.is_some_and(&mut is_pending)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.0.iter().enumerate().filter_map(|(line, ino)| Some((line, (*ino)?)))
    }
}
