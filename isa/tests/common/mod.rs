#![allow(dead_code)]

use isa::{
    BridgeId, BusHandle, DeviceId, DriverIntr, IntrCookie, IntrError, IntrFlags, OpenFirmware,
    ParentBus, ReleaseError, Resource, ResourceRequest, Space,
};
use std::sync::{Arc, Mutex, Once};

pub static ISAB_DTB: &[u8] = include_bytes!("../../../port/lib/test/fdt/isab.dtb");

pub const BRIDGE: BridgeId = BridgeId::new(0, 7, 0);
pub const BUS: DeviceId = DeviceId(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Alloc(DeviceId, ResourceRequest),
    Release(DeviceId, Resource),
    Setup(DeviceId, u64, usize),
    Teardown(DeviceId, IntrCookie),
    Handle(Space, u64),
}

/// A parent bus that grants exactly what it is asked for and remembers
/// every call.
#[derive(Debug, Default)]
pub struct MockParent {
    pub calls: Vec<Call>,
    pub pending: Vec<u32>,
    pub refuse: bool,
    pub no_handles: bool,
    next_cookie: u64,
}

impl MockParent {
    pub fn allocs(&self) -> Vec<ResourceRequest> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Alloc(_, req) => Some(*req),
                _ => None,
            })
            .collect()
    }

    pub fn releases(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::Release(..))).count()
    }
}

impl ParentBus for MockParent {
    fn alloc_resource(&mut self, child: DeviceId, req: &ResourceRequest) -> Option<Resource> {
        self.calls.push(Call::Alloc(child, *req));
        (!self.refuse).then_some(Resource {
            kind: req.kind,
            rid: req.rid,
            start: req.start,
            end: req.end,
            count: req.count,
            flags: req.flags,
        })
    }

    fn release_resource(&mut self, child: DeviceId, res: &Resource) -> Result<(), ReleaseError> {
        self.calls.push(Call::Release(child, *res));
        Ok(())
    }

    fn setup_intr(
        &mut self,
        child: DeviceId,
        irq: &Resource,
        _flags: IntrFlags,
        handler: DriverIntr,
        arg: usize,
    ) -> Result<IntrCookie, IntrError> {
        handler(arg);
        self.calls.push(Call::Setup(child, irq.start, arg));
        self.next_cookie += 1;
        Ok(IntrCookie(self.next_cookie))
    }

    fn teardown_intr(&mut self, child: DeviceId, _irq: &Resource, cookie: IntrCookie) -> Result<(), IntrError> {
        self.calls.push(Call::Teardown(child, cookie));
        if cookie.0 == 0 || cookie.0 > self.next_cookie {
            return Err(IntrError::NoHandler);
        }
        Ok(())
    }

    fn intr_pending(&self, ino: u32) -> bool {
        self.pending.contains(&ino)
    }

    fn bus_handle(&mut self, space: Space, base: u64) -> Option<BusHandle> {
        self.calls.push(Call::Handle(space, base));
        (!self.no_handles).then_some(BusHandle(base | (space as u64) << 60))
    }
}

/// Firmware made of parent-linked nodes.  Node 0 is a host bridge holding
/// the interrupt map, node 1 the ISA bridge.
#[derive(Clone, Debug)]
pub struct Firmware {
    nodes: Vec<(Option<usize>, Vec<(&'static str, Vec<u8>)>)>,
}

fn be(cells: &[u32]) -> Vec<u8> {
    cells.iter().flat_map(|c| c.to_be_bytes()).collect()
}

impl Firmware {
    /// Bridge at pci0:7:0 whose I/O window is `io` and memory window `mem`,
    /// both `(base, size)`, with ISA line `n` wired to INO `0x20 + n` for
    /// each line in `lines`.
    pub fn new(io: Option<(u64, u32)>, mem: Option<(u64, u32)>, lines: &[u32]) -> Self {
        let mut ranges = Vec::new();
        if let Some((base, size)) = io {
            ranges.extend([1, 0, 0x0100_3810, (base >> 32) as u32, base as u32, size]);
        }
        if let Some((base, size)) = mem {
            ranges.extend([0, 0, 0x0200_3814, (base >> 32) as u32, base as u32, size]);
        }
        let imap: Vec<u32> = lines.iter().flat_map(|&l| [0x3800, 0, 0, l, 1, 0x20 + l]).collect();
        Self {
            nodes: vec![
                (
                    None,
                    vec![
                        ("interrupt-map", be(&imap)),
                        ("interrupt-map-mask", be(&[0xf800, 0, 0, 7])),
                    ],
                ),
                (Some(0), vec![("reg", be(&[0x3800, 0, 0, 0, 0])), ("ranges", be(&ranges))]),
            ],
        }
    }
}

impl OpenFirmware for Firmware {
    type Node = usize;

    fn find_pci_node(&self, bridge: BridgeId) -> Option<usize> {
        (bridge == BRIDGE).then_some(1)
    }

    fn parent(&self, node: usize) -> Option<usize> {
        self.nodes[node].0
    }

    fn getprop(&self, node: usize, name: &str) -> Option<&[u8]> {
        self.nodes[node].1.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_slice())
    }
}

#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl port::devcons::Uart for Capture {
    fn putb(&mut self, b: u8) {
        self.0.lock().unwrap().push(b);
    }
}

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Console output of the whole test binary.
pub fn console() -> Capture {
    static INIT: Once = Once::new();
    static CONSOLE: Mutex<Option<Capture>> = Mutex::new(None);
    INIT.call_once(|| {
        let uart = Capture::default();
        *CONSOLE.lock().unwrap() = Some(uart.clone());
        port::devcons::init(Box::leak(Box::new(uart)), log::LevelFilter::Debug).unwrap();
    });
    CONSOLE.lock().unwrap().clone().unwrap()
}
