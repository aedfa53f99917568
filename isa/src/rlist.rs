use crate::resource::{Resource, ResourceType};
use alloc::collections::BTreeMap;

/// One resource slot of a child.  Bounds are relative to the ISA bus; `res`
/// is the live allocation while the slot is busy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResourceListEntry {
    pub start: u64,
    pub end: u64,
    pub count: u64,
    pub res: Option<Resource>,
}

impl ResourceListEntry {
    pub fn is_busy(&self) -> bool {
        self.res.is_some()
    }
}

/// A child's resource slots, keyed by type and index.
#[derive(Clone, Debug, Default)]
pub struct ResourceList {
    entries: BTreeMap<(ResourceType, u32), ResourceListEntry>,
}

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, kind: ResourceType, rid: u32) -> Option<&ResourceListEntry> {
        self.entries.get(&(kind, rid))
    }

    pub fn find_mut(&mut self, kind: ResourceType, rid: u32) -> Option<&mut ResourceListEntry> {
        self.entries.get_mut(&(kind, rid))
    }

    /// Set the bounds of slot `rid`, creating it free if it doesn't exist.
    /// A busy slot keeps its allocation.
    pub fn add(&mut self, kind: ResourceType, rid: u32, start: u64, end: u64, count: u64) -> &mut ResourceListEntry {
        let entry = self.entries.entry((kind, rid)).or_insert(ResourceListEntry { start, end, count, res: None });
        entry.start = start;
        entry.end = end;
        entry.count = count;
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slots ordered by type, then index.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, u32, &ResourceListEntry)> + '_ {
        self.entries.iter().map(|(&(kind, rid), entry)| (kind, rid, entry))
    }
}
