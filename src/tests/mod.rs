mod dispatch;
mod iteration;

use std::collections::HashSet;

use crate::enumerate::Enumerator;
use crate::memory::MemoryRegistry;
use crate::registry::Context;

/// Standard fixture universe. Four enumerable devices (usb1, 1-1, sda,
/// serial8250) plus two subsystem-less tree linkers (the pci root and the
/// usb interface), so parent chains run through devices that are not part
/// of the universe.
pub(crate) const UNIVERSE: &str = r#"
P: /devices/pci0000:00

P: /devices/pci0000:00/usb1
E: SUBSYSTEM=usb
E: DEVTYPE=usb_device
E: ID_BUS=usb
A: removable=0
G: seat

P: /devices/pci0000:00/usb1/1-1
E: SUBSYSTEM=usb
E: DEVTYPE=usb_device
E: ID_BUS=usb
E: ID_MODEL=Stick
E: USEC_INITIALIZED=1234567
A: removable=1
A: size=4096
G: seat
G: uaccess

P: /devices/pci0000:00/usb1/1-1/1-1:1.0

P: /devices/pci0000:00/usb1/1-1/1-1:1.0/host0/target0/sda
E: SUBSYSTEM=block
E: DEVTYPE=disk
E: ID_BUS=usb
E: ID_MODEL=Stick
E: ID_CDROM=1
A: removable=1
A: size=62333952
G: seat
G: systemd

P: /devices/platform/serial8250
E: SUBSYSTEM=platform
E: DRIVER=serial8250
"#;

pub(crate) const USB1: &str = "/devices/pci0000:00/usb1";
pub(crate) const STICK: &str = "/devices/pci0000:00/usb1/1-1";
pub(crate) const SDA: &str = "/devices/pci0000:00/usb1/1-1/1-1:1.0/host0/target0/sda";
pub(crate) const SERIAL: &str = "/devices/platform/serial8250";

pub(crate) fn universe(export: &str) -> Context {
    Context::with_backend(MemoryRegistry::from_export(export).unwrap())
}

pub(crate) fn fixture() -> Context {
    universe(UNIVERSE)
}

/// Matching syspaths, in scan order.
pub(crate) fn paths(devices: &Enumerator) -> Vec<String> {
    devices
        .scan()
        .unwrap()
        .map(|device| device.unwrap().syspath().to_string())
        .collect()
}

pub(crate) fn path_set(devices: &Enumerator) -> HashSet<String> {
    paths(devices).into_iter().collect()
}

pub(crate) fn all_paths(context: &Context) -> HashSet<String> {
    path_set(&context.list_devices())
}
