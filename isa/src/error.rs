use crate::loader::LoadError;
use crate::resource::ResourceType;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    #[error("no {0:?} resource {1} configured")]
    NoSuchResource(ResourceType, u32),
    #[error("{0:?} index {1} out of range")]
    IndexOutOfRange(ResourceType, u32),
    #[error("bus has no {0:?} window")]
    NoWindow(ResourceType),
    #[error("could not map interrupt {0}")]
    Unmapped(u64),
    #[error("{0:?} resource {1} is busy")]
    SlotBusy(ResourceType, u32),
    #[error("parent bus refused {0:?} resource {1}")]
    ParentDeclined(ResourceType, u32),
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ReleaseError {
    #[error("{0:?} resource {1} is not allocated")]
    NotAllocated(ResourceType, u32),
    #[error("{0:?} resource {1} released with a foreign handle")]
    HandleMismatch(ResourceType, u32),
    #[error("parent bus refused the release")]
    Parent,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum IntrError {
    #[error("interrupt handler refused")]
    Refused,
    #[error("no such interrupt handler")]
    NoHandler,
}

/// Conditions that mean the bus, its firmware or one of its drivers is
/// broken.  There is no recovering from these.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Defect {
    #[error("bridge firmware: {0}")]
    Firmware(#[from] LoadError),
    #[error("allocation of interrupt range {start:#x}-{end:#x} not supported")]
    InterruptRange { start: u64, end: u64 },
    #[error("cannot pass through default interrupt allocation")]
    DefaultIrqPassthrough,
    #[error("{kind:?} resource {rid} allocated while busy")]
    SlotBusy { kind: ResourceType, rid: u32 },
    #[error("{kind:?} resource {rid} ({start:#x}-{end:#x}) outside bus window {base:#x}-{limit:#x}")]
    OutOfWindow { kind: ResourceType, rid: u32, start: u64, end: u64, base: u64, limit: u64 },
}

/// Log `defect` and stop.
#[cold]
#[track_caller]
pub fn fatal(defect: Defect) -> ! {
    log::error!("isa: {defect}");
    panic!("isa: {defect}");
}
