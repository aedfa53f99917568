//! OpenFirmware data as the bridge sees it: the PCI address word, the cell
//! rows of the `reg`, `ranges`, `interrupt-map` and `interrupt-map-mask`
//! properties, and the handful of firmware lookups the loader needs.

use bitfield_struct::bitfield;
use core::fmt;
use port::fdt::{DeviceTree, Node};
use static_assertions::const_assert_eq;
use zerocopy::byteorder::big_endian::U32;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// Address space code of a PCI address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Space {
    Config = 0,
    Io = 1,
    Mem32 = 2,
    Mem64 = 3,
}

impl Space {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value & 3 {
            0 => Self::Config,
            1 => Self::Io,
            2 => Self::Mem32,
            _ => Self::Mem64,
        }
    }
}

/// The `phys.hi` cell of a PCI address as OpenFirmware encodes it.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PhysHi {
    pub register: u8,
    #[bits(3)]
    pub function: u8,
    #[bits(5)]
    pub device: u8,
    pub bus: u8,
    #[bits(2)]
    pub space: Space,
    #[bits(3)]
    _reserved: u8,
    pub aliased: bool,
    pub prefetchable: bool,
    pub non_relocatable: bool,
}

/// Where the bridge sits on its PCI bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BridgeId {
    pub bus: u8,
    pub slot: u8,
    pub function: u8,
}

impl BridgeId {
    pub const fn new(bus: u8, slot: u8, function: u8) -> Self {
        Self { bus, slot, function }
    }

    /// Does the PCI address `hi` name this bridge's configuration space?
    pub fn matches(&self, hi: PhysHi) -> bool {
        hi.bus() == self.bus && hi.device() == self.slot && hi.function() == self.function
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "pci{}:{}:{}", self.bus, self.slot, self.function)
    }
}

/// First entry of a PCI node's `reg` property.
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct PciRegister {
    pub phys_hi: U32,
    pub phys_mid: U32,
    pub phys_lo: U32,
    pub size_hi: U32,
    pub size_lo: U32,
}

impl PciRegister {
    pub fn hi(&self) -> PhysHi {
        PhysHi::from_bits(self.phys_hi.get())
    }

    /// The three address cells, as interrupt-map lookups key on them.
    pub fn address(&self) -> [u32; 3] {
        [self.phys_hi.get(), self.phys_mid.get(), self.phys_lo.get()]
    }
}

/// One row of an ISA bridge's `ranges`: a two-cell ISA address, the PCI
/// address it lands on, and the size of the range.
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct IsaRange {
    pub child_hi: U32,
    pub child_lo: U32,
    pub phys_hi: U32,
    pub phys_mid: U32,
    pub phys_lo: U32,
    pub size: U32,
}

impl IsaRange {
    pub fn space(&self) -> Space {
        PhysHi::from_bits(self.phys_hi.get()).space()
    }

    pub fn phys(&self) -> u64 {
        u64::from(self.phys_mid.get()) << 32 | u64::from(self.phys_lo.get())
    }
}

/// One `interrupt-map` row: child unit address, child interrupt, the
/// phandle of the interrupt parent and the interrupt it is known by there.
#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ImapEntry {
    pub phys_hi: U32,
    pub phys_mid: U32,
    pub phys_lo: U32,
    pub intr: U32,
    pub parent: U32,
    pub parent_intr: U32,
}

impl ImapEntry {
    pub fn key(&self) -> [u32; 4] {
        [self.phys_hi.get(), self.phys_mid.get(), self.phys_lo.get(), self.intr.get()]
    }
}

#[derive(Clone, Copy, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ImapMask {
    pub phys_hi: U32,
    pub phys_mid: U32,
    pub phys_lo: U32,
    pub intr: U32,
}

impl ImapMask {
    pub fn apply(&self, key: [u32; 4]) -> [u32; 4] {
        let mask = [self.phys_hi.get(), self.phys_mid.get(), self.phys_lo.get(), self.intr.get()];
        core::array::from_fn(|i| key[i] & mask[i])
    }
}

const_assert_eq!(core::mem::size_of::<PciRegister>(), 5 * 4);
const_assert_eq!(core::mem::size_of::<IsaRange>(), 6 * 4);
const_assert_eq!(core::mem::size_of::<ImapEntry>(), 6 * 4);
const_assert_eq!(core::mem::size_of::<ImapMask>(), 4 * 4);

/// The firmware lookups the bridge needs.  Nodes are opaque handles.
pub trait OpenFirmware {
    type Node: Copy;

    /// The node of the PCI function `bridge`.
    fn find_pci_node(&self, bridge: BridgeId) -> Option<Self::Node>;
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;
    fn getprop(&self, node: Self::Node, name: &str) -> Option<&[u8]>;
}

impl OpenFirmware for DeviceTree<'_> {
    type Node = Node;

    /// A PCI function is a child of a node with three address cells whose
    /// first `reg` entry is the function's configuration space.
    fn find_pci_node(&self, bridge: BridgeId) -> Option<Node> {
        self.nodes().find(|node| {
            let on_pci = DeviceTree::parent(self, node)
                .is_some_and(|p| self.address_size_cells(Some(&p)).0 == 3);
            let reg = self
                .property_bytes(node, "reg")
                .and_then(|bytes| PciRegister::read_from_prefix(bytes).ok());
            on_pci && reg.is_some_and(|(reg, _)| bridge.matches(reg.hi()))
        })
    }

    fn parent(&self, node: Node) -> Option<Node> {
        DeviceTree::parent(self, &node)
    }

    fn getprop(&self, node: Node, name: &str) -> Option<&[u8]> {
        self.property_bytes(&node, name)
    }
}
