//! The bus attached behind the bridge of the checked-in devicetree: an I/O
//! window at 0 of 64K, a memory window at 0 of 4M, and only ISA line 4
//! wired (to INO 9).

mod common;

use common::{console, Call, MockParent, BRIDGE, BUS, ISAB_DTB};
use isa::{AllocError, BusConfig, Device, DeviceId, IsaBus, ResourceFlags, ResourceType, Space};
use port::fdt::{DeviceTree, Node};

const KBD: Device = Device::new(DeviceId(10), BUS);

fn attach(dt: &DeviceTree) -> IsaBus<Node, MockParent> {
    IsaBus::attach(BUS, dt, BRIDGE, MockParent::default(), BusConfig::default())
}

#[test]
fn windows_and_handles() {
    let dt = DeviceTree::new(ISAB_DTB).unwrap();
    let bus = attach(&dt);

    let io = bus.io_window().unwrap();
    assert_eq!((io.base(), io.limit()), (0, 0xffff));
    let mem = bus.mem_window().unwrap();
    assert_eq!((mem.base(), mem.limit()), (0, 0x3f_ffff));

    assert_eq!(bus.parent().calls, vec![Call::Handle(Space::Io, 0), Call::Handle(Space::Mem32, 0)]);
    assert!(bus.io_handle().is_some());
    assert_ne!(bus.io_handle(), bus.mem_handle());
    assert_eq!(dt.node_name(&bus.bridge().node), Some("isa@7"));
}

#[test]
fn routing() {
    let dt = DeviceTree::new(ISAB_DTB).unwrap();
    let bus = attach(&dt);

    assert_eq!(bus.route(4), Some(9));
    for line in [0, 1, 2, 3, 5, 6, 7] {
        assert_eq!(bus.route(line), None, "line {line}");
    }
    // Same answer every time.
    let first: Vec<_> = (0..8).map(|l| bus.route(l)).collect();
    let again: Vec<_> = (0..8).map(|l| bus.route(l)).collect();
    assert_eq!(first, again);
    let other = attach(&dt);
    assert_eq!(first, (0..8).map(|l| other.route(l)).collect::<Vec<_>>());
}

#[test]
fn translation() {
    let dt = DeviceTree::new(ISAB_DTB).unwrap();
    let bus = attach(&dt);

    assert_eq!(bus.translate(ResourceType::IoPort, 0x60, 0x64), Ok((0x60, 0x64)));
    assert_eq!(bus.translate(ResourceType::Memory, 0xa_0000, 0xb_ffff), Ok((0xa_0000, 0xb_ffff)));
    // Clamped to the window.
    assert_eq!(bus.translate(ResourceType::IoPort, 0xfff0, 0x1_0010), Ok((0xfff0, 0xffff)));
    assert_eq!(bus.translate(ResourceType::Irq, 4, 4), Err(AllocError::NoWindow(ResourceType::Irq)));
}

#[test]
fn keyboard_attach() {
    let console = console();
    let dt = DeviceTree::new(ISAB_DTB).unwrap();
    let mut bus = attach(&dt);

    // Nothing configured, so a default interrupt request has nothing to
    // resolve to.
    assert_eq!(
        bus.alloc_resource(KBD, ResourceType::Irq, 0, 0, u64::MAX, 1, ResourceFlags::ACTIVE),
        Err(AllocError::NoSuchResource(ResourceType::Irq, 0))
    );

    let ports = bus
        .alloc_resource(KBD, ResourceType::IoPort, 0, 0x60, 0x64, 5, ResourceFlags::ACTIVE)
        .unwrap();
    assert_eq!((ports.start, ports.end), (0x60, 0x64));

    let irq = bus.alloc_resource(KBD, ResourceType::Irq, 0, 4, 4, 1, ResourceFlags::ACTIVE).unwrap();
    assert_eq!((irq.start, irq.end), (9, 9));

    assert_eq!(
        bus.alloc_resource(KBD, ResourceType::Irq, 1, 1, 1, 1, ResourceFlags::ACTIVE),
        Err(AllocError::Unmapped(1))
    );
    assert!(console.text().contains("could not map interrupt 1"));

    let granted: Vec<_> = bus.parent().allocs().iter().map(|r| (r.kind, r.start, r.end)).collect();
    assert_eq!(granted, vec![(ResourceType::IoPort, 0x60, 0x64), (ResourceType::Irq, 9, 9)]);
}

#[test]
fn pending_only_line_4() {
    let dt = DeviceTree::new(ISAB_DTB).unwrap();
    let mut bus = attach(&dt);

    assert_eq!(bus.irq_pending(), 0);
    bus.parent_mut().pending = (0..64).collect();
    assert_eq!(bus.irq_pending(), 1 << 4);
    bus.parent_mut().pending = vec![9];
    assert_eq!(bus.irq_pending(), 1 << 4);
    bus.parent_mut().pending = vec![4, 0x20];
    assert_eq!(bus.irq_pending(), 0);
}

#[test]
fn attach_is_logged() {
    let dt = DeviceTree::new(ISAB_DTB).unwrap();
    let console = console();
    attach(&dt);
    let text = console.text();
    assert!(text.contains("isa: pci0:7:0 line 4 -> ino 0x9"));
    assert!(text.contains("isa: Io window 0x0-0xffff"));
    assert!(text.contains("isa: Mem32 window 0x0-0x3fffff"));
}
