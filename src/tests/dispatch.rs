//! Routing of the generic dispatcher: reserved keys go to their dedicated
//! filters exactly once, everything else becomes a property filter.

use pretty_assertions::assert_eq;

use crate::match_many;
use crate::tests::{SDA, SERIAL, STICK, USB1, fixture, paths};

#[test]
fn reserved_subsystem_routes_to_match_subsystem() {
    let context = fixture();

    let mut dispatched = context.list_devices();
    dispatched.match_many([("subsystem", "usb")]).unwrap();

    let mut direct = context.list_devices();
    direct.match_subsystem("usb");

    assert_eq!(paths(&dispatched), paths(&direct));
}

#[test]
fn reserved_sys_name_routes_to_match_sys_name() {
    let context = fixture();

    let mut dispatched = context.list_devices();
    dispatched.match_many([("sys_name", "sda")]).unwrap();

    assert_eq!(paths(&dispatched), vec![SDA.to_string()]);
}

#[test]
fn reserved_tag_routes_to_match_tag() {
    let context = fixture();

    let mut dispatched = context.list_devices();
    dispatched.match_many([("tag", "uaccess")]).unwrap();

    assert_eq!(paths(&dispatched), vec![STICK.to_string()]);
}

#[test]
fn reserved_parent_routes_to_match_parent_by_syspath() {
    let context = fixture();

    let mut dispatched = context.list_devices();
    dispatched.match_many([("parent", USB1)]).unwrap();

    assert_eq!(
        paths(&dispatched),
        vec![USB1.to_string(), STICK.to_string(), SDA.to_string()]
    );
}

#[test]
fn unknown_parent_fails_fast() {
    let context = fixture();

    let mut dispatched = context.list_devices();
    let error = dispatched
        .match_many([("parent", "/devices/never")])
        .map(|_| ())
        .unwrap_err();
    assert!(error.to_string().contains("parent filter"));

    // The failure did not corrupt the accumulated set.
    assert_eq!(paths(&dispatched).len(), 4);
}

#[test]
fn other_keys_become_property_filters() {
    let context = fixture();

    let mut dispatched = context.list_devices();
    dispatched
        .match_many([("ID_MODEL", "Stick"), ("DRIVER", "serial8250")])
        .unwrap();

    let mut direct = context.list_devices();
    direct
        .match_property("ID_MODEL", "Stick")
        .match_property("DRIVER", "serial8250");

    assert_eq!(paths(&dispatched), paths(&direct));
    assert_eq!(
        paths(&dispatched),
        vec![STICK.to_string(), SDA.to_string(), SERIAL.to_string()]
    );
}

#[test]
fn mixed_call_is_equivalent_to_chained_dedicated_calls() {
    let context = fixture();

    let mut dispatched = context.list_devices();
    dispatched
        .match_many([
            ("subsystem", "usb"),
            ("sys_name", "1-1"),
            ("ID_MODEL", "Stick"),
        ])
        .unwrap();

    let mut chained = context.list_devices();
    chained
        .match_subsystem("usb")
        .match_sys_name("1-1")
        .match_property("ID_MODEL", "Stick");

    assert_eq!(paths(&dispatched), paths(&chained));
    assert_eq!(paths(&dispatched), vec![STICK.to_string()]);
}

#[test]
fn keyword_macro() {
    let context = fixture();

    let mut devices = context.list_devices();
    match_many!(devices, subsystem = "usb", ID_MODEL = "Stick").unwrap();

    assert_eq!(paths(&devices), vec![STICK.to_string()]);
}

#[test]
fn keyword_macro_with_typed_values() {
    let context = fixture();

    let mut devices = context.list_devices();
    match_many!(devices, USEC_INITIALIZED = 1234567, ID_CDROM = true).unwrap();

    // Two property alternatives, canonicalized from their typed forms.
    assert_eq!(paths(&devices), vec![STICK.to_string(), SDA.to_string()]);
}
