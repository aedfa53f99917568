use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Kinds of resource an ISA device can ask for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ResourceType {
    Irq = 1,
    Drq = 2,
    Memory = 3,
    IoPort = 4,
}

bitflags! {
    /// Allocation flags.  The bus never interprets these, it hands them to
    /// its parent.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ResourceFlags: u32 {
        const ACTIVE = 0x0002;
        const SHAREABLE = 0x0004;
        const TIMESHARE = 0x0008;
        const PREFETCHABLE = 0x1000;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct IntrFlags: u32 {
        const FAST = 0x0080;
        const EXCL = 0x0100;
        const MPSAFE = 0x0200;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DeviceId(pub u32);

/// A device as a bus sees it: the device and the bus it is attached to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub parent: DeviceId,
}

impl Device {
    pub const fn new(id: DeviceId, parent: DeviceId) -> Self {
        Self { id, parent }
    }
}

/// What the bus asks of its parent.  Bounds are in the parent's address
/// space, or the INO for interrupts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResourceRequest {
    pub kind: ResourceType,
    pub rid: u32,
    pub start: u64,
    pub end: u64,
    pub count: u64,
    pub flags: ResourceFlags,
}

/// A live allocation, as granted by the parent bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resource {
    pub kind: ResourceType,
    pub rid: u32,
    pub start: u64,
    pub end: u64,
    pub count: u64,
    pub flags: ResourceFlags,
}

impl Resource {
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}
