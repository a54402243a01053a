//! Device handles.
//!
//! A [`Device`] wraps one record from the registry. Properties and tags were
//! materialized when the record was built; attributes go through the backend
//! on first access and are cached for the lifetime of the handle. Identity
//! (equality, hashing) is the canonical registry path alone: two handles to
//! the same syspath are the same device no matter what their attribute
//! caches hold.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use fxhash::FxHashMap;

use crate::errors::RegistryResult;
use crate::registry::{Context, DeviceRecord};
use crate::value::MatchValue;

#[derive(Debug, Clone)]
pub struct Device {
    context: Context,
    record: Rc<DeviceRecord>,
    attributes: Rc<RefCell<FxHashMap<String, Option<String>>>>,
}

impl Device {
    pub(crate) fn from_record(context: Context, record: DeviceRecord) -> Self {
        Device {
            context,
            record: Rc::new(record),
            attributes: Rc::new(RefCell::new(FxHashMap::default())),
        }
    }

    /// Canonical registry path; the device's identity.
    pub fn syspath(&self) -> &str {
        &self.record.syspath
    }

    pub fn sys_name(&self) -> &str {
        &self.record.sys_name
    }

    pub fn subsystem(&self) -> Option<&str> {
        self.record.subsystem.as_deref()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.record.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.record
            .properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Property parsed as an integer. `Ok(None)` when the property is
    /// absent, `InvalidValueType` when present but not an integer.
    pub fn property_as_int(&self, key: &str) -> RegistryResult<Option<i64>> {
        self.property(key).map(MatchValue::parse_int).transpose()
    }

    pub fn property_as_bool(&self, key: &str) -> RegistryResult<Option<bool>> {
        self.property(key).map(MatchValue::parse_bool).transpose()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.record.tags.iter().map(String::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.record.tags.contains(tag)
    }

    /// Attribute value, resolved through the backend on first access and
    /// cached on this handle. Absence is not an error.
    pub fn attribute(&self, name: &str) -> RegistryResult<Option<String>> {
        if let Some(cached) = self.attributes.borrow().get(name) {
            return Ok(cached.clone());
        }
        let value = self
            .context
            .backend()
            .read_attribute(self.syspath(), name)?;
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        Ok(value)
    }

    pub fn attribute_as_int(&self, name: &str) -> RegistryResult<Option<i64>> {
        self.attribute(name)?
            .as_deref()
            .map(MatchValue::parse_int)
            .transpose()
    }

    pub fn attribute_as_bool(&self, name: &str) -> RegistryResult<Option<bool>> {
        self.attribute(name)?
            .as_deref()
            .map(MatchValue::parse_bool)
            .transpose()
    }

    /// The parent device, if the registry reports one.
    pub fn parent(&self) -> RegistryResult<Option<Device>> {
        let Some(parent) = self.record.parent.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .context
            .backend()
            .lookup(parent)?
            .map(|record| Device::from_record(self.context.clone(), record)))
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.syspath() == other.syspath()
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.syspath().hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.syspath())
    }
}
