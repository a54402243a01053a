//!
//! ## Introduction
//! `sysdev` enumerates the devices an operating-system registry exposes and
//! filters them with composable match criteria. The live backend walks
//! sysfs and merges the udev device database; an in-memory backend serves
//! embedded and test use. What this crate is really about is the
//! *composition semantics* of the filters; see [`enumerate`] for the laws.
//!
//! ## Terminology
//!
//! ### Universe
//! The set of devices the registry reports at the moment a scan starts.
//! The universe is live: two scans of the same enumerator may see different
//! devices. Devices without a subsystem are not part of the universe (they
//! still appear as parents of devices that are).
//!
//! ### Categories and polarity
//! Every filter belongs to a category (subsystem, sys name, property,
//! attribute, tag, parent) and has a polarity, match or no-match. Within a
//! category, subsystem/sys-name/property matches are *alternatives* (OR),
//! attribute matches are *refinements* (AND), and no-match values always
//! exclude. Categories combine by conjunction. The asymmetry between
//! properties and attributes is inherited from the registry and preserved
//! deliberately.
//!
//! ## Example
//!
//! ```
//! use sysdev::memory::MemoryRegistry;
//! use sysdev::registry::Context;
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = MemoryRegistry::from_export(
//!     r#"
//! P: /devices/pci0000:00/usb1
//! E: SUBSYSTEM=usb
//!
//! P: /devices/pci0000:00/nvme0
//! E: SUBSYSTEM=block
//! "#,
//! )?;
//! let context = Context::with_backend(registry);
//!
//! let mut devices = context.list_devices();
//! devices.match_subsystem("usb");
//! for device in devices.scan()? {
//!     println!("{}", device?.syspath());
//! }
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod enumerate;
pub mod errors;
pub mod macros;
pub mod memory;
pub mod registry;
pub mod sysfs;
pub mod value;

#[cfg(test)]
mod tests;

pub type SysdevResult<T> = anyhow::Result<T>;
