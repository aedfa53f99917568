use crate::resource::ResourceType;
use serde::Deserialize;

/// How many slots of each type a child may have.  Requests for an index at
/// or past the limit are refused.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct SlotLimits {
    pub irq: u32,
    pub drq: u32,
    pub memory: u32,
    pub ioport: u32,
}

impl Default for SlotLimits {
    fn default() -> Self {
        Self { irq: 8, drq: 2, memory: 4, ioport: 8 }
    }
}

impl SlotLimits {
    pub fn limit(&self, kind: ResourceType) -> u32 {
        match kind {
            ResourceType::Irq => self.irq,
            ResourceType::Drq => self.drq,
            ResourceType::Memory => self.memory,
            ResourceType::IoPort => self.ioport,
        }
    }
}

/// Bus tunables, as found in the `[isa]` table of a kernel configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    pub slots: SlotLimits,
}
