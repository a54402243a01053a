use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::errors::{RegistryError, RegistryResult};
use crate::memory::MemoryRegistry;
use crate::registry::{Context, DeviceRecord, RegistryBackend};
use crate::tests::{SDA, STICK, UNIVERSE, fixture, paths};

#[test]
fn scans_are_restartable() {
    let context = fixture();
    let mut devices = context.list_devices();
    devices.match_subsystem("usb");

    assert_eq!(paths(&devices), paths(&devices));
}

#[test_log::test]
fn rescanning_sees_a_live_universe() {
    let backend = Rc::new(RefCell::new(
        MemoryRegistry::from_export(UNIVERSE).unwrap(),
    ));
    let context = Context::with_backend(backend.clone());

    let mut devices = context.list_devices();
    devices.match_subsystem("usb");
    assert_eq!(paths(&devices).len(), 2);

    let mut hotplugged = DeviceRecord::new("/devices/pci0000:00/usb1/1-2");
    hotplugged
        .properties
        .insert("SUBSYSTEM".to_string(), "usb".to_string());
    backend.borrow_mut().push(hotplugged);

    // Same enumerator, fresh snapshot.
    assert_eq!(paths(&devices).len(), 3);
}

#[test]
fn results_are_deduplicated_by_syspath() {
    let context = crate::tests::universe(
        r#"
P: /devices/a
E: SUBSYSTEM=usb

P: /devices/a
E: SUBSYSTEM=usb
"#,
    );

    assert_eq!(paths(&context.list_devices()), vec!["/devices/a".to_string()]);
}

#[test]
fn results_follow_the_natural_order() {
    let context = crate::tests::universe(
        r#"
P: /devices/z
E: SUBSYSTEM=usb

P: /devices/a
E: SUBSYSTEM=usb
"#,
    );

    // The in-memory registry enumerates in insertion order; the enumerator
    // does not reorder.
    assert_eq!(
        paths(&context.list_devices()),
        vec!["/devices/z".to_string(), "/devices/a".to_string()]
    );
}

#[test]
fn into_iterator_over_a_shared_reference() {
    let context = fixture();
    let mut devices = context.list_devices();
    devices.match_subsystem("usb");

    let mut count = 0;
    for device in &devices {
        device.unwrap();
        count += 1;
    }
    assert_eq!(count, 2);
}

/// Backend whose attribute reads fail for one device, for exercising error
/// propagation out of a lazy scan.
#[derive(Debug)]
struct FlakyAttributes {
    inner: MemoryRegistry,
    broken: String,
}

impl RegistryBackend for FlakyAttributes {
    fn enumerate(&self) -> RegistryResult<Vec<DeviceRecord>> {
        self.inner.enumerate()
    }

    fn lookup(&self, syspath: &str) -> RegistryResult<Option<DeviceRecord>> {
        self.inner.lookup(syspath)
    }

    fn read_attribute(&self, syspath: &str, name: &str) -> RegistryResult<Option<String>> {
        if syspath == self.broken {
            return Err(RegistryError::from(io::Error::other("attribute store gone")).into());
        }
        self.inner.read_attribute(syspath, name)
    }

    fn version(&self) -> u32 {
        self.inner.version()
    }
}

#[test]
fn attribute_failures_surface_at_the_failing_device() {
    let backend = FlakyAttributes {
        inner: MemoryRegistry::from_export(UNIVERSE).unwrap(),
        broken: SDA.to_string(),
    };
    let context = Context::with_backend(backend);

    let mut devices = context.list_devices();
    devices.match_attribute("removable", "1");

    let results: Vec<_> = devices.scan().unwrap().collect();
    assert_eq!(results.len(), 2);

    // The stick was yielded before the failure and stays valid.
    assert_eq!(results[0].as_ref().unwrap().syspath(), STICK);
    assert!(results[1].is_err());
}

#[test]
fn partial_iteration_has_no_side_effects() {
    let context = fixture();
    let mut devices = context.list_devices();
    devices.match_subsystem("usb");

    let first = devices.scan().unwrap().next().unwrap().unwrap();
    assert_eq!(first.syspath(), "/devices/pci0000:00/usb1");

    // Abandoning the scan above changes nothing for the next one.
    assert_eq!(paths(&devices).len(), 2);
}
