//! Resource management for an ISA bus behind a PCI-ISA bridge, with the
//! bridge described by OpenFirmware.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod bus;
pub mod config;
pub mod error;
pub mod intr;
pub mod loader;
pub mod ofw;
pub mod resource;
pub mod rlist;
pub mod window;

pub use bus::{BusHandle, DriverIntr, IntrCookie, IsaBus, ParentBus};
pub use config::{BusConfig, SlotLimits};
pub use error::{AllocError, Defect, IntrError, ReleaseError};
pub use ofw::{BridgeId, OpenFirmware, Space};
pub use resource::{Device, DeviceId, IntrFlags, Resource, ResourceFlags, ResourceRequest, ResourceType};
