//! The registry connection and the backend seam behind it.
//!
//! A [`Context`] is the process-wide handle to one device registry. It hands
//! out [`Enumerator`]s and resolves individual devices. The actual universe
//! of devices comes from a [`RegistryBackend`]: the sysfs walker in
//! [`crate::sysfs`] for the live system, or [`crate::memory::MemoryRegistry`]
//! for embedded and test use. A context may be cloned freely; clones share
//! the same connection and are meant for single-threaded use.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::device::Device;
use crate::enumerate::Enumerator;
use crate::errors::{RegistryError, RegistryResult};

/// Version reported for registries that have no way of telling theirs.
pub const DEFAULT_REGISTRY_VERSION: u32 = 251;

/// Raw device data as produced by a backend.
///
/// Properties and tags are fully materialized here; attributes are not part
/// of the record and are resolved lazily through the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub syspath: String,
    pub sys_name: String,
    pub subsystem: Option<String>,
    pub properties: IndexMap<String, String>,
    pub tags: IndexSet<String>,
    pub parent: Option<String>,
}

impl DeviceRecord {
    pub fn new(syspath: impl Into<String>) -> Self {
        let syspath = syspath.into();
        let sys_name = syspath
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        DeviceRecord {
            syspath,
            sys_name,
            subsystem: None,
            properties: IndexMap::new(),
            tags: IndexSet::new(),
            parent: None,
        }
    }
}

/// One line of a device database block.
///
/// The same line grammar serves the on-disk database in `/run/udev/data` and
/// the export-format fixtures of [`crate::memory::MemoryRegistry`]; the `A:`
/// prefix is a fixture extension (real attributes live in sysfs files).
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum DbLine<'a> {
    /// `P:` starts a record in export format.
    Syspath(&'a str),
    /// `E:KEY=VALUE`
    Property(&'a str, &'a str),
    /// `G:tag` or `Q:tag`
    Tag(&'a str),
    /// `A:NAME=VALUE`
    Attribute(&'a str, &'a str),
    /// Any other known-prefix line (`N:`, `S:`, `L:`, `V:`, ...).
    Other,
}

static DB_LINE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<prefix>[A-Z]):\s?(?P<rest>.*)$").unwrap());

pub(crate) fn parse_db_line(line: &str) -> RegistryResult<DbLine<'_>> {
    let malformed = || -> anyhow::Error {
        RegistryError::MalformedRecord {
            line: line.to_string(),
        }
        .into()
    };

    let captures = DB_LINE_REGEX.captures(line).ok_or_else(malformed)?;
    let rest = captures.name("rest").map(|m| m.as_str()).unwrap_or_default();

    match &captures["prefix"] {
        "P" => Ok(DbLine::Syspath(rest)),
        "E" => {
            let (key, value) = rest.split_once('=').ok_or_else(malformed)?;
            Ok(DbLine::Property(key, value))
        }
        "G" | "Q" => Ok(DbLine::Tag(rest)),
        "A" => {
            let (name, value) = rest.split_once('=').ok_or_else(malformed)?;
            Ok(DbLine::Attribute(name, value))
        }
        _ => Ok(DbLine::Other),
    }
}

/// The external collaborator that physically walks the device registry.
pub trait RegistryBackend: fmt::Debug {
    /// Every device record known to the registry, in the registry's natural
    /// enumeration order. Subsystem-less devices are included; the
    /// enumerator excludes them from the universe but still needs them to
    /// link the device tree together.
    fn enumerate(&self) -> RegistryResult<Vec<DeviceRecord>>;

    /// One record by syspath, if the registry knows it.
    fn lookup(&self, syspath: &str) -> RegistryResult<Option<DeviceRecord>> {
        Ok(self
            .enumerate()?
            .into_iter()
            .find(|record| record.syspath == syspath))
    }

    /// Resolve one attribute of one device. May block on the underlying
    /// system call. `Ok(None)` when the attribute does not exist.
    fn read_attribute(&self, syspath: &str, name: &str) -> RegistryResult<Option<String>>;

    /// Version of the connected registry. Gates tag and parent filters.
    fn version(&self) -> u32;
}

// Shared-handle form, for callers that keep mutating the registry while
// contexts bound to it stay alive (the universe is live between scans).
impl<B: RegistryBackend> RegistryBackend for Rc<RefCell<B>> {
    fn enumerate(&self) -> RegistryResult<Vec<DeviceRecord>> {
        self.borrow().enumerate()
    }

    fn lookup(&self, syspath: &str) -> RegistryResult<Option<DeviceRecord>> {
        self.borrow().lookup(syspath)
    }

    fn read_attribute(&self, syspath: &str, name: &str) -> RegistryResult<Option<String>> {
        self.borrow().read_attribute(syspath, name)
    }

    fn version(&self) -> u32 {
        self.borrow().version()
    }
}

/// Handle to one device registry connection.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    backend: Box<dyn RegistryBackend>,
    version: Cell<Option<u32>>,
}

impl Context {
    /// Connects to the system registry (sysfs plus the udev device
    /// database).
    pub fn new() -> Self {
        Context::with_backend(crate::sysfs::SysfsRegistry::new())
    }

    /// Binds an arbitrary backend.
    pub fn with_backend(backend: impl RegistryBackend + 'static) -> Self {
        Context {
            inner: Rc::new(ContextInner {
                backend: Box::new(backend),
                version: Cell::new(None),
            }),
        }
    }

    /// A fresh [`Enumerator`] over the current device universe.
    pub fn list_devices(&self) -> Enumerator {
        Enumerator::new(self.clone())
    }

    /// Resolves one device by its canonical registry path.
    pub fn device_from_syspath(&self, syspath: &str) -> RegistryResult<Device> {
        let record = self.backend().lookup(syspath)?.ok_or_else(|| {
            RegistryError::DeviceNotFound {
                syspath: syspath.to_string(),
            }
        })?;
        Ok(Device::from_record(self.clone(), record))
    }

    /// Registry version, probed once per connection.
    pub fn version(&self) -> u32 {
        if let Some(version) = self.inner.version.get() {
            return version;
        }
        let version = self.inner.backend.version();
        self.inner.version.set(Some(version));
        version
    }

    pub(crate) fn backend(&self) -> &dyn RegistryBackend {
        self.inner.backend.as_ref()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}
