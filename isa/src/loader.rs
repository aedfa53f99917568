//! Reads what the bridge needs out of firmware, once, when the bus attaches.

use crate::intr::InterruptMap;
use crate::ofw::{BridgeId, ImapEntry, ImapMask, IsaRange, OpenFirmware, PciRegister, Space};
use alloc::vec::Vec;
use thiserror::Error;
use zerocopy::FromBytes;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("no firmware node for bridge {0}")]
    NoBridgeNode(BridgeId),
    #[error("cannot get bridge reg property")]
    NoRegister,
    #[error("cannot get bridge ranges property")]
    NoRanges,
    #[error("no interrupt-map on the bridge or its ancestors")]
    NoInterruptMap,
    #[error("interrupt-map without a usable interrupt-map-mask")]
    NoInterruptMapMask,
}

pub type Result<T> = core::result::Result<T, LoadError>;

/// The bridge's firmware node and the first entry of its `reg`.
#[derive(Clone, Copy, Debug)]
pub struct BridgeDescriptor<N> {
    pub id: BridgeId,
    pub node: N,
    pub reg: PciRegister,
}

/// A `ranges` row reduced to what window discovery needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangeEntry {
    pub space: Space,
    pub base: u64,
    pub size: u64,
}

impl From<&IsaRange> for RangeEntry {
    fn from(row: &IsaRange) -> Self {
        Self { space: row.space(), base: row.phys(), size: u64::from(row.size.get()) }
    }
}

#[derive(Clone, Debug)]
pub struct FirmwareTables<N> {
    pub bridge: BridgeDescriptor<N>,
    pub ranges: Vec<RangeEntry>,
    pub imap: InterruptMap,
}

impl<N: Copy> FirmwareTables<N> {
    pub fn load<F: OpenFirmware<Node = N>>(fw: &F, id: BridgeId) -> Result<Self> {
        let node = fw.find_pci_node(id).ok_or(LoadError::NoBridgeNode(id))?;
        let (reg, _) = fw
            .getprop(node, "reg")
            .and_then(|bytes| PciRegister::read_from_prefix(bytes).ok())
            .ok_or(LoadError::NoRegister)?;
        let ranges = fw
            .getprop(node, "ranges")
            .and_then(|bytes| <[IsaRange]>::ref_from_bytes(bytes).ok())
            .filter(|rows| !rows.is_empty())
            .ok_or(LoadError::NoRanges)?;
        let imap = find_imap(fw, node)?;

        Ok(Self {
            bridge: BridgeDescriptor { id, node, reg },
            ranges: ranges.iter().map(RangeEntry::from).collect(),
            imap,
        })
    }
}

/// The interrupt map sits on the bridge or on the closest ancestor that has
/// one, and its mask on the same node.
fn find_imap<F: OpenFirmware>(fw: &F, node: F::Node) -> Result<InterruptMap> {
    let mut cur = Some(node);
    while let Some(n) = cur {
        let entries = fw
            .getprop(n, "interrupt-map")
            .and_then(|bytes| <[ImapEntry]>::ref_from_bytes(bytes).ok())
            .filter(|entries| !entries.is_empty());
        if let Some(entries) = entries {
            let mask = fw
                .getprop(n, "interrupt-map-mask")
                .and_then(|bytes| ImapMask::read_from_bytes(bytes).ok())
                .ok_or(LoadError::NoInterruptMapMask)?;
            return Ok(InterruptMap::new(entries.to_vec(), mask));
        }
        cur = fw.parent(n);
    }
    Err(LoadError::NoInterruptMap)
}
