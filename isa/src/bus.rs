//! The ISA bus proper.  An `IsaBus` sits behind one PCI-ISA bridge and hands
//! out the resources of the devices attached to it: I/O ports and memory
//! inside the bridge's windows, legacy interrupt lines and DMA channels.
//! The parent bus owns the actual address and interrupt spaces; this layer
//! keeps per-child bookkeeping, translates ISA addresses into parent
//! addresses and routes ISA interrupt lines to INOs.
//!
//! Requests from devices that are not our own children (a grandchild going
//! through us to reach the parent, say) are passed through after
//! translation, without any bookkeeping.

use crate::config::BusConfig;
use crate::error::{fatal, AllocError, Defect, IntrError, ReleaseError};
use crate::intr::{InterruptMap, LegacyIrqTable};
use crate::loader::{BridgeDescriptor, FirmwareTables};
use crate::ofw::{BridgeId, OpenFirmware, PciRegister, Space};
use crate::resource::{
    Device, DeviceId, IntrFlags, Resource, ResourceFlags, ResourceRequest, ResourceType,
};
use crate::rlist::{ResourceList, ResourceListEntry};
use crate::window::{Window, Windows};
use alloc::collections::BTreeMap;
use log::{debug, info, warn};

/// Handle the parent hands out for access to one of its address spaces.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BusHandle(pub u64);

/// Identifies an installed interrupt handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IntrCookie(pub u64);

pub type DriverIntr = fn(usize);

/// What the bus needs from the bus it hangs off.
pub trait ParentBus {
    /// Reserve `req`, or None if it can't be had.
    fn alloc_resource(&mut self, child: DeviceId, req: &ResourceRequest) -> Option<Resource>;
    fn release_resource(&mut self, child: DeviceId, res: &Resource) -> Result<(), ReleaseError>;
    fn setup_intr(
        &mut self,
        child: DeviceId,
        irq: &Resource,
        flags: IntrFlags,
        handler: DriverIntr,
        arg: usize,
    ) -> Result<IntrCookie, IntrError>;
    fn teardown_intr(&mut self, child: DeviceId, irq: &Resource, cookie: IntrCookie) -> Result<(), IntrError>;
    /// Is interrupt `ino` asserted?
    fn intr_pending(&self, ino: u32) -> bool;
    /// Handle for the parent address space `space`, starting at `base`.
    fn bus_handle(&mut self, space: Space, base: u64) -> Option<BusHandle>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct MappedWindow {
    window: Window,
    handle: BusHandle,
}

pub struct IsaBus<N, P> {
    dev: DeviceId,
    bridge: BridgeDescriptor<N>,
    imap: InterruptMap,
    irqs: LegacyIrqTable,
    io: Option<MappedWindow>,
    mem: Option<MappedWindow>,
    config: BusConfig,
    children: BTreeMap<DeviceId, ResourceList>,
    parent: P,
}

impl<N: Copy, P: ParentBus> IsaBus<N, P> {
    /// Attach the bus `dev` behind `bridge`.  The bridge's windows and
    /// interrupt wiring come from firmware; a bridge firmware doesn't
    /// describe is fatal.
    pub fn attach<F>(dev: DeviceId, fw: &F, bridge: BridgeId, mut parent: P, config: BusConfig) -> Self
    where
        F: OpenFirmware<Node = N>,
    {
        let tables = FirmwareTables::load(fw, bridge).unwrap_or_else(|e| fatal(e.into()));

        let irqs = LegacyIrqTable::new(&tables.imap, &tables.bridge.reg);
        for (line, ino) in irqs.iter() {
            info!("isa: {bridge} line {line} -> ino {ino:#x}");
        }

        let windows = Windows::fold(&tables.ranges);
        let io = windows.io.and_then(|w| map_window(&mut parent, Space::Io, w));
        let mem = windows.mem.and_then(|w| map_window(&mut parent, Space::Mem32, w));

        Self {
            dev,
            bridge: tables.bridge,
            imap: tables.imap,
            irqs,
            io,
            mem,
            config,
            children: BTreeMap::new(),
            parent,
        }
    }

    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    pub fn bridge(&self) -> &BridgeDescriptor<N> {
        &self.bridge
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn parent(&self) -> &P {
        &self.parent
    }

    pub fn parent_mut(&mut self) -> &mut P {
        &mut self.parent
    }

    pub fn io_window(&self) -> Option<Window> {
        self.io.map(|m| m.window)
    }

    pub fn mem_window(&self) -> Option<Window> {
        self.mem.map(|m| m.window)
    }

    pub fn io_handle(&self) -> Option<BusHandle> {
        self.io.map(|m| m.handle)
    }

    pub fn mem_handle(&self) -> Option<BusHandle> {
        self.mem.map(|m| m.handle)
    }

    /// INO wired to legacy interrupt `line`.
    pub fn route(&self, line: usize) -> Option<u32> {
        self.irqs.ino(line)
    }

    fn window(&self, kind: ResourceType) -> Option<Window> {
        match kind {
            ResourceType::Memory => self.mem_window(),
            ResourceType::IoPort => self.io_window(),
            ResourceType::Irq | ResourceType::Drq => None,
        }
    }

    /// Map ISA bus addresses `[start, end]` of a memory or I/O-port range
    /// into the parent's address space.
    pub fn translate(&self, kind: ResourceType, start: u64, end: u64) -> Result<(u64, u64), AllocError> {
        let window = self.window(kind).ok_or(AllocError::NoWindow(kind))?;
        Ok(window.translate(start, end))
    }

    /// Map a parent address back to an ISA bus address.
    pub fn to_child(&self, kind: ResourceType, addr: u64) -> Result<u64, AllocError> {
        let window = self.window(kind).ok_or(AllocError::NoWindow(kind))?;
        Ok(window.to_child(addr))
    }

    /// Allocate resource `rid` of type `kind` for `child`.  `start == 0` with
    /// `end == u64::MAX` asks for whatever the slot was configured with.
    ///
    /// Allocating a slot that is already allocated is a driver bug and
    /// fatal, as are interrupt ranges wider than one line.
    #[allow(clippy::too_many_arguments)]
    pub fn alloc_resource(
        &mut self,
        child: Device,
        kind: ResourceType,
        rid: u32,
        start: u64,
        end: u64,
        count: u64,
        flags: ResourceFlags,
    ) -> Result<Resource, AllocError> {
        let passthrough = child.parent != self.dev;
        let isdefault = start == 0 && end == u64::MAX;

        if !passthrough && !isdefault {
            let limit = self.config.slots.limit(kind);
            let rl = self.children.entry(child.id).or_default();
            if rl.find(kind, rid).is_none() {
                if rid >= limit {
                    return Err(AllocError::IndexOutOfRange(kind, rid));
                }
                rl.add(kind, rid, start, end, count);
            }
        }

        let window = match kind {
            ResourceType::Memory | ResourceType::IoPort => {
                Some(self.window(kind).ok_or(AllocError::NoWindow(kind))?)
            }
            ResourceType::Irq | ResourceType::Drq => None,
        };

        let (mut start, mut end, mut count) = (start, end, count);
        match kind {
            ResourceType::Memory | ResourceType::IoPort => {
                if let Some(w) = window {
                    (start, end) = w.translate(start, end);
                }
            }
            ResourceType::Irq if isdefault => {
                if passthrough {
                    fatal(Defect::DefaultIrqPassthrough);
                }
            }
            ResourceType::Irq => {
                let ino = u64::from(route_irq(&self.imap, &self.bridge.reg, start, end)?);
                (start, end) = (ino, ino);
            }
            ResourceType::Drq => {}
        }

        if passthrough {
            let req = ResourceRequest { kind, rid, start, end, count, flags };
            return self.parent.alloc_resource(child.id, &req).ok_or(AllocError::ParentDeclined(kind, rid));
        }

        let rle = self
            .children
            .get_mut(&child.id)
            .and_then(|rl| rl.find_mut(kind, rid))
            .ok_or(AllocError::NoSuchResource(kind, rid))?;
        if rle.is_busy() {
            fatal(Defect::SlotBusy { kind, rid });
        }

        if isdefault {
            start = rle.start;
            count = count.max(rle.count);
            end = rle.end.max(start.saturating_add(count).saturating_sub(1));
            match (kind, window) {
                (_, Some(w)) => {
                    let (s, e) = (start.saturating_add(w.base()), end.saturating_add(w.base()));
                    if !w.contains(s) || !w.contains(e) {
                        fatal(Defect::OutOfWindow {
                            kind,
                            rid,
                            start: s,
                            end: e,
                            base: w.base(),
                            limit: w.limit(),
                        });
                    }
                    (start, end) = (s, e);
                }
                (ResourceType::Irq, None) => {
                    let ino = u64::from(route_irq(&self.imap, &self.bridge.reg, start, end)?);
                    (start, end) = (ino, ino);
                }
                _ => {}
            }
        }

        let req = ResourceRequest { kind, rid, start, end, count, flags };
        let Some(res) = self.parent.alloc_resource(child.id, &req) else {
            debug!("isa: parent refused {kind:?} {rid} {start:#x}-{end:#x} for {:?}", child.id);
            return Err(AllocError::ParentDeclined(kind, rid));
        };

        let base = window.map_or(0, |w| w.base());
        rle.start = res.start.saturating_sub(base);
        rle.end = res.end.saturating_sub(base);
        rle.count = count;
        rle.res = Some(res);
        debug!("isa: {kind:?} {rid} {:#x}-{:#x} allocated to {:?}", res.start, res.end, child.id);
        Ok(res)
    }

    /// Give back an allocation.  `res` must be the handle `alloc_resource`
    /// returned for the slot.
    pub fn release_resource(
        &mut self,
        child: Device,
        kind: ResourceType,
        rid: u32,
        res: &Resource,
    ) -> Result<(), ReleaseError> {
        if child.parent != self.dev {
            return self.parent.release_resource(child.id, res);
        }

        let rle = self
            .children
            .get_mut(&child.id)
            .and_then(|rl| rl.find_mut(kind, rid))
            .ok_or(ReleaseError::NotAllocated(kind, rid))?;
        match rle.res {
            None => Err(ReleaseError::NotAllocated(kind, rid)),
            Some(live) if live != *res => Err(ReleaseError::HandleMismatch(kind, rid)),
            Some(_) => {
                self.parent.release_resource(child.id, res)?;
                rle.res = None;
                debug!("isa: {kind:?} {rid} released by {:?}", child.id);
                Ok(())
            }
        }
    }

    pub fn setup_intr(
        &mut self,
        child: Device,
        irq: &Resource,
        flags: IntrFlags,
        handler: DriverIntr,
        arg: usize,
    ) -> Result<IntrCookie, IntrError> {
        self.parent.setup_intr(child.id, irq, flags, handler, arg)
    }

    pub fn teardown_intr(&mut self, child: Device, irq: &Resource, cookie: IntrCookie) -> Result<(), IntrError> {
        self.parent.teardown_intr(child.id, irq, cookie)
    }

    /// Record where slot `rid` of `child` is configured to live, in ISA bus
    /// terms.  Default allocations of the slot resolve to this.
    pub fn set_resource(
        &mut self,
        child: DeviceId,
        kind: ResourceType,
        rid: u32,
        start: u64,
        count: u64,
    ) -> Result<(), AllocError> {
        if rid >= self.config.slots.limit(kind) {
            return Err(AllocError::IndexOutOfRange(kind, rid));
        }
        let rl = self.children.entry(child).or_default();
        if rl.find(kind, rid).is_some_and(ResourceListEntry::is_busy) {
            return Err(AllocError::SlotBusy(kind, rid));
        }
        rl.add(kind, rid, start, start.saturating_add(count).saturating_sub(1), count);
        Ok(())
    }

    /// `(start, count)` of slot `rid` of `child`.
    pub fn get_resource(&self, child: DeviceId, kind: ResourceType, rid: u32) -> Option<(u64, u64)> {
        let entry = self.children.get(&child)?.find(kind, rid)?;
        Some((entry.start, entry.count))
    }

    pub fn resources(&self, child: DeviceId) -> impl Iterator<Item = (ResourceType, u32, &ResourceListEntry)> + '_ {
        self.children.get(&child).into_iter().flat_map(|rl| rl.iter())
    }

    /// Pending state of the legacy lines, line 0 in bit 0.
    pub fn irq_pending(&self) -> u8 {
        self.irqs.pending(|ino| self.parent.intr_pending(ino))
    }
}

fn map_window<P: ParentBus>(parent: &mut P, space: Space, window: Window) -> Option<MappedWindow> {
    let Some(handle) = parent.bus_handle(space, window.base()) else {
        warn!("isa: no bus handle for {space:?} space at {:#x}", window.base());
        return None;
    };
    info!("isa: {space:?} window {:#x}-{:#x}", window.base(), window.limit());
    Some(MappedWindow { window, handle })
}

/// INO for the single interrupt line `start`.  A range of lines is a driver
/// bug.
fn route_irq(imap: &InterruptMap, reg: &PciRegister, start: u64, end: u64) -> Result<u32, AllocError> {
    if start != end {
        fatal(Defect::InterruptRange { start, end });
    }
    let ino = u32::try_from(start).ok().and_then(|line| imap.route(reg, line));
    ino.ok_or_else(|| {
        warn!("isa: could not map interrupt {start}");
        AllocError::Unmapped(start)
    })
}
