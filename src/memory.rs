//! In-memory registry backend.
//!
//! Built either programmatically or from `udevadm info --export-db`-style
//! text. The natural enumeration order is insertion order, parent links are
//! derived from syspath nesting, and attributes (normally sysfs files) are
//! held in a side table fed by `A:NAME=VALUE` lines.

use fxhash::FxHashMap;
use indexmap::IndexMap;

use crate::errors::{RegistryError, RegistryResult};
use crate::registry::{
    DEFAULT_REGISTRY_VERSION, DbLine, DeviceRecord, RegistryBackend, parse_db_line,
};

#[derive(Debug)]
pub struct MemoryRegistry {
    records: Vec<DeviceRecord>,
    attributes: FxHashMap<String, IndexMap<String, String>>,
    version: u32,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        MemoryRegistry {
            records: Vec::new(),
            attributes: FxHashMap::default(),
            version: DEFAULT_REGISTRY_VERSION,
        }
    }

    /// Overrides the reported registry version, for exercising the
    /// version-gated filters.
    pub fn at_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Parses a full universe out of export-format text: blocks of
    /// `P:`/`E:`/`G:`/`A:` lines separated by blank lines.
    ///
    /// ```
    /// use sysdev::memory::MemoryRegistry;
    ///
    /// let registry = MemoryRegistry::from_export(
    ///     r#"
    /// P: /devices/platform/serial8250
    /// E: SUBSYSTEM=platform
    /// G: seat
    /// "#,
    /// )
    /// .unwrap();
    /// ```
    pub fn from_export(text: &str) -> RegistryResult<Self> {
        let mut registry = MemoryRegistry::new();
        let mut current: Option<DeviceRecord> = None;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                if let Some(record) = current.take() {
                    registry.push(record);
                }
                continue;
            }

            match parse_db_line(line)? {
                DbLine::Syspath(path) => {
                    if let Some(record) = current.take() {
                        registry.push(record);
                    }
                    current = Some(DeviceRecord::new(path));
                }
                parsed => {
                    let Some(record) = current.as_mut() else {
                        return Err(RegistryError::MalformedRecord {
                            line: line.to_string(),
                        }
                        .into());
                    };
                    match parsed {
                        DbLine::Property(key, value) => {
                            record.properties.insert(key.to_string(), value.to_string());
                        }
                        DbLine::Tag(tag) => {
                            record.tags.insert(tag.to_string());
                        }
                        DbLine::Attribute(name, value) => {
                            registry
                                .attributes
                                .entry(record.syspath.clone())
                                .or_default()
                                .insert(name.to_string(), value.to_string());
                        }
                        DbLine::Syspath(_) => unreachable!(),
                        DbLine::Other => {}
                    }
                }
            }
        }

        if let Some(record) = current.take() {
            registry.push(record);
        }

        Ok(registry)
    }

    /// Appends a record. The subsystem falls back to the `SUBSYSTEM`
    /// property when not set explicitly.
    pub fn push(&mut self, mut record: DeviceRecord) -> &mut Self {
        if record.subsystem.is_none() {
            record.subsystem = record.properties.get("SUBSYSTEM").cloned();
        }
        self.records.push(record);
        self
    }

    pub fn insert_attribute(
        &mut self,
        syspath: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.attributes
            .entry(syspath.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    /// The longest other record path that properly prefixes `syspath` at a
    /// `/` boundary. Nesting is what makes a device a child here, exactly as
    /// in sysfs; intermediate paths that were never recorded are skipped
    /// over.
    fn parent_of(&self, syspath: &str) -> Option<String> {
        self.records
            .iter()
            .filter(|record| {
                record.syspath != syspath
                    && syspath.starts_with(&record.syspath)
                    && syspath.as_bytes().get(record.syspath.len()) == Some(&b'/')
            })
            .max_by_key(|record| record.syspath.len())
            .map(|record| record.syspath.clone())
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        MemoryRegistry::new()
    }
}

impl RegistryBackend for MemoryRegistry {
    fn enumerate(&self) -> RegistryResult<Vec<DeviceRecord>> {
        let mut records = self.records.clone();
        for record in &mut records {
            record.parent = self.parent_of(&record.syspath);
        }
        Ok(records)
    }

    fn lookup(&self, syspath: &str) -> RegistryResult<Option<DeviceRecord>> {
        Ok(self
            .records
            .iter()
            .find(|record| record.syspath == syspath)
            .cloned()
            .map(|mut record| {
                record.parent = self.parent_of(&record.syspath);
                record
            }))
    }

    fn read_attribute(&self, syspath: &str, name: &str) -> RegistryResult<Option<String>> {
        Ok(self
            .attributes
            .get(syspath)
            .and_then(|attributes| attributes.get(name))
            .cloned())
    }

    fn version(&self) -> u32 {
        self.version
    }
}
