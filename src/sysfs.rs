//! The system registry backend: sysfs plus the udev device database.
//!
//! Devices are every `uevent`-bearing directory under `/sys/devices`. The
//! kernel half of a record comes from the `uevent` file and the `subsystem`
//! symlink; the userspace half (persistent properties, tags) is merged from
//! the device database under `/run/udev/data`, keyed by device number,
//! interface index, or `+subsystem:sysname`. Attributes are plain sysfs
//! files, read on demand.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::{fs, io};

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::errors::{RegistryError, RegistryResult};
use crate::registry::{DEFAULT_REGISTRY_VERSION, DbLine, DeviceRecord, RegistryBackend, parse_db_line};

#[derive(Debug)]
pub struct SysfsRegistry {
    sys_root: PathBuf,
    db_root: PathBuf,
    version: OnceCell<u32>,
}

impl SysfsRegistry {
    pub fn new() -> Self {
        SysfsRegistry::with_roots("/sys", "/run/udev/data")
    }

    /// Alternate filesystem roots, for scanning a captured tree.
    pub fn with_roots(sys_root: impl Into<PathBuf>, db_root: impl Into<PathBuf>) -> Self {
        SysfsRegistry {
            sys_root: sys_root.into(),
            db_root: db_root.into(),
            version: OnceCell::new(),
        }
    }

    fn devices_root(&self) -> PathBuf {
        self.sys_root.join("devices")
    }

    /// Collects every device directory, in sorted order. Directories reached
    /// through symlinks are not descended into; sysfs links them back into
    /// the same tree.
    fn collect_syspaths(&self) -> RegistryResult<BTreeSet<String>> {
        let mut paths = BTreeSet::new();
        let mut pending = vec![self.devices_root()];

        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(error) if dir == self.devices_root() => {
                    return Err(RegistryError::from(error).into());
                }
                Err(error) => {
                    debug!(dir = %dir.display(), %error, "skipping unreadable directory");
                    continue;
                }
            };
            for entry in entries {
                let Ok(entry) = entry else { continue };
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if !file_type.is_dir() {
                    continue;
                }
                let path = entry.path();
                if path.join("uevent").is_file() {
                    paths.insert(path.to_string_lossy().into_owned());
                }
                pending.push(path);
            }
        }

        Ok(paths)
    }

    fn build_record(&self, syspath: &str, universe: Option<&BTreeSet<String>>) -> DeviceRecord {
        let dir = Path::new(syspath);
        let mut record = DeviceRecord::new(syspath);

        record.subsystem = fs::read_link(dir.join("subsystem"))
            .ok()
            .and_then(|target| {
                target
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            });

        if let Ok(devpath) = dir.strip_prefix(&self.sys_root) {
            record.properties.insert(
                "DEVPATH".to_string(),
                format!("/{}", devpath.to_string_lossy()),
            );
        }
        if let Some(subsystem) = &record.subsystem {
            record
                .properties
                .insert("SUBSYSTEM".to_string(), subsystem.clone());
        }

        match fs::read_to_string(dir.join("uevent")) {
            Ok(uevent) => {
                for line in uevent.lines() {
                    if let Some((key, value)) = line.split_once('=') {
                        record.properties.insert(key.to_string(), value.to_string());
                    }
                }
            }
            Err(error) => {
                debug!(%syspath, %error, "uevent not readable");
            }
        }

        self.merge_database(&mut record);

        record.parent = match universe {
            Some(universe) => nearest_ancestor(syspath, |candidate| universe.contains(candidate)),
            None => nearest_ancestor(syspath, |candidate| {
                Path::new(candidate).join("uevent").is_file()
            }),
        };

        record
    }

    /// Merges `E:` properties and `G:`/`Q:` tags from the device database.
    /// A missing database file just means the device has no userspace state.
    fn merge_database(&self, record: &mut DeviceRecord) {
        let Some(id) = database_id(
            record.subsystem.as_deref(),
            &record.sys_name,
            &record.properties,
        ) else {
            return;
        };

        let contents = match fs::read_to_string(self.db_root.join(&id)) {
            Ok(contents) => contents,
            Err(_) => return,
        };

        for line in contents.lines() {
            match parse_db_line(line) {
                Ok(DbLine::Property(key, value)) => {
                    record.properties.insert(key.to_string(), value.to_string());
                }
                Ok(DbLine::Tag(tag)) => {
                    record.tags.insert(tag.to_string());
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(%id, %error, "skipping malformed database line");
                }
            }
        }
    }
}

impl Default for SysfsRegistry {
    fn default() -> Self {
        SysfsRegistry::new()
    }
}

impl RegistryBackend for SysfsRegistry {
    fn enumerate(&self) -> RegistryResult<Vec<DeviceRecord>> {
        let syspaths = self.collect_syspaths()?;
        debug!(devices = syspaths.len(), sys_root = %self.sys_root.display(), "walked sysfs");
        Ok(syspaths
            .iter()
            .map(|syspath| self.build_record(syspath, Some(&syspaths)))
            .collect())
    }

    fn lookup(&self, syspath: &str) -> RegistryResult<Option<DeviceRecord>> {
        if !Path::new(syspath).join("uevent").is_file() {
            return Ok(None);
        }
        Ok(Some(self.build_record(syspath, None)))
    }

    fn read_attribute(&self, syspath: &str, name: &str) -> RegistryResult<Option<String>> {
        let path = Path::new(syspath).join(name);
        if path.is_dir() {
            return Ok(None);
        }
        match fs::read(&path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                Ok(Some(text.trim_end_matches('\n').to_string()))
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(RegistryError::from(error).into()),
        }
    }

    fn version(&self) -> u32 {
        *self.version.get_or_init(probe_version)
    }
}

/// Device database file name for a record: `b<maj>:<min>` / `c<maj>:<min>`
/// for devices with a device number, `n<ifindex>` for network interfaces,
/// `+<subsystem>:<sysname>` for the rest. Subsystem-less devices have no
/// database entry.
fn database_id(
    subsystem: Option<&str>,
    sys_name: &str,
    properties: &IndexMap<String, String>,
) -> Option<String> {
    let subsystem = subsystem?;
    if let (Some(major), Some(minor)) = (properties.get("MAJOR"), properties.get("MINOR")) {
        let kind = if subsystem == "block" { 'b' } else { 'c' };
        return Some(format!("{kind}{major}:{minor}"));
    }
    if subsystem == "net" {
        if let Some(ifindex) = properties.get("IFINDEX") {
            return Some(format!("n{ifindex}"));
        }
    }
    Some(format!("+{subsystem}:{sys_name}"))
}

fn nearest_ancestor(syspath: &str, mut is_device: impl FnMut(&str) -> bool) -> Option<String> {
    Path::new(syspath)
        .ancestors()
        .skip(1)
        .map(|ancestor| ancestor.to_string_lossy())
        .take_while(|ancestor| ancestor.contains("/devices/"))
        .find(|ancestor| is_device(ancestor.as_ref()))
        .map(|ancestor| ancestor.into_owned())
}

fn probe_version() -> u32 {
    let output = match Command::new("udevadm").arg("--version").output() {
        Ok(output) if output.status.success() => output,
        _ => return DEFAULT_REGISTRY_VERSION,
    };
    parse_version(&String::from_utf8_lossy(&output.stdout)).unwrap_or(DEFAULT_REGISTRY_VERSION)
}

fn parse_version(text: &str) -> Option<u32> {
    text.split_whitespace()
        .filter_map(|token| {
            let digits: String = token.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .next()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_parsing() {
        assert_eq!(parse_version("251"), Some(251));
        assert_eq!(parse_version("systemd 257 (257.5-2)"), Some(257));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn database_ids() {
        let mut properties = IndexMap::new();
        assert_eq!(
            database_id(Some("pci"), "0000:00:1d.0", &properties),
            Some("+pci:0000:00:1d.0".to_string())
        );
        assert_eq!(database_id(None, "pci0000:00", &properties), None);

        properties.insert("MAJOR".to_string(), "189".to_string());
        properties.insert("MINOR".to_string(), "1".to_string());
        assert_eq!(
            database_id(Some("usb"), "1-1", &properties),
            Some("c189:1".to_string())
        );
        assert_eq!(
            database_id(Some("block"), "sda", &properties),
            Some("b189:1".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn scans_a_captured_tree() {
        use std::os::unix::fs::symlink;

        let root = tempfile::tempdir().unwrap();
        let sys = root.path().join("sys");
        let db = root.path().join("db");

        let hub = sys.join("devices/pci0000:00/usb1");
        let stick = hub.join("1-1");
        fs::create_dir_all(&stick).unwrap();
        fs::create_dir_all(sys.join("bus/usb")).unwrap();
        fs::create_dir_all(&db).unwrap();

        fs::write(hub.join("uevent"), "DEVTYPE=usb_device\n").unwrap();
        fs::write(stick.join("uevent"), "MAJOR=189\nMINOR=1\n").unwrap();
        fs::write(stick.join("removable"), "1\n").unwrap();
        symlink("../../../bus/usb", hub.join("subsystem")).unwrap();
        symlink("../../../../bus/usb", stick.join("subsystem")).unwrap();

        fs::write(db.join("c189:1"), "E:ID_MODEL=Stick\nG:seat\n").unwrap();

        let registry = SysfsRegistry::with_roots(&sys, &db);
        let records = registry.enumerate().unwrap();
        assert_eq!(records.len(), 2);

        let stick_path = stick.to_string_lossy().into_owned();
        let record = records
            .iter()
            .find(|record| record.syspath == stick_path)
            .unwrap();
        assert_eq!(record.subsystem.as_deref(), Some("usb"));
        assert_eq!(record.sys_name, "1-1");
        assert_eq!(
            record.properties.get("ID_MODEL").map(String::as_str),
            Some("Stick")
        );
        assert!(record.tags.contains("seat"));
        assert_eq!(record.parent.as_deref(), Some(&*hub.to_string_lossy()));

        assert_eq!(
            registry.read_attribute(&stick_path, "removable").unwrap(),
            Some("1".to_string())
        );
        assert_eq!(registry.read_attribute(&stick_path, "missing").unwrap(), None);
    }
}
