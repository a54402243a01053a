//! Device enumeration with composable match criteria.
//!
//! An [`Enumerator`] is a mutable, single-owner query builder: each match
//! call appends a constraint, and consuming the enumerator evaluates the
//! accumulated set lazily against the device universe. The combination laws
//! are non-uniform and deliberate:
//!
//! - subsystem, sys-name, and property *matches* are alternatives: any one
//!   of them satisfies its category (OR);
//! - attribute matches are independently required refinements: all of them
//!   must hold (AND);
//! - no-match values exclude: a surviving device mismatches every no-match
//!   value of the category;
//! - categories conjoin, and an empty category imposes nothing;
//! - parent filters restrict the universe to the subtrees of the given
//!   parents before anything else runs.
//!
//! The property-OR/attribute-AND asymmetry is inherited from the registry's
//! native query semantics (properties are indexed and unioned, attributes
//! are post-filtered). It is a load-bearing part of the contract; do not
//! unify it.

use std::fmt;

use fxhash::FxHashMap;
use indexmap::IndexSet;
use itertools::Itertools;
use petgraph::graph::NodeIndex;
use petgraph::prelude::StableGraph;
use petgraph::visit::Bfs;
use tracing::{debug, trace};

use crate::device::Device;
use crate::errors::{RegistryError, RegistryResult};
use crate::registry::{Context, DeviceRecord};
use crate::value::MatchValue;

pub(crate) const TAG_MINIMUM_VERSION: u32 = 154;
pub(crate) const PARENT_MINIMUM_VERSION: u32 = 172;

/// Keys the generic dispatcher routes to dedicated filters. Every other key
/// adds a property filter.
pub const RESERVED_KEYS: [&str; 4] = ["subsystem", "sys_name", "tag", "parent"];

/// Match/no-match values for a category that tests one device field.
#[derive(Debug, Clone, Default)]
struct ValueFilter {
    matches: IndexSet<String>,
    nomatches: IndexSet<String>,
}

impl ValueFilter {
    fn accepts(&self, value: &str) -> bool {
        (self.matches.is_empty() || self.matches.contains(value))
            && !self.nomatches.contains(value)
    }
}

/// Match/no-match key/value pairs for the property and attribute categories.
#[derive(Debug, Clone, Default)]
struct KeyValueFilter {
    matches: IndexSet<(String, String)>,
    nomatches: IndexSet<(String, String)>,
}

/// The accumulated constraint set, partitioned by category. Append-only for
/// the lifetime of the enumerator; nothing ever overwrites an earlier
/// constraint.
#[derive(Debug, Clone, Default)]
struct MatchSet {
    subsystem: ValueFilter,
    sys_name: IndexSet<String>,
    property: KeyValueFilter,
    attribute: KeyValueFilter,
    tag: IndexSet<String>,
    parents: IndexSet<String>,
}

impl MatchSet {
    /// The record-local part of the predicate: everything that can be
    /// decided without touching sysfs.
    fn accepts_record(&self, record: &DeviceRecord) -> bool {
        let subsystem = record.subsystem.as_deref().unwrap_or_default();
        if !self.subsystem.accepts(subsystem) {
            return false;
        }

        if !self.sys_name.is_empty() && !self.sys_name.contains(&record.sys_name) {
            return false;
        }

        // Property matches are a disjunction: one satisfied pair is enough.
        if !self.property.matches.is_empty()
            && !self
                .property
                .matches
                .iter()
                .any(|(key, value)| record.properties.get(key) == Some(value))
        {
            return false;
        }
        if self
            .property
            .nomatches
            .iter()
            .any(|(key, value)| record.properties.get(key) == Some(value))
        {
            return false;
        }

        // A device must carry every requested tag.
        self.tag.iter().all(|tag| record.tags.contains(tag))
    }

    /// The attribute part of the predicate. Resolution is lazy and may
    /// block; read failures surface to the caller.
    fn accepts_attributes(&self, device: &Device) -> RegistryResult<bool> {
        // Attribute matches are a conjunction, unlike properties.
        for (name, value) in &self.attribute.matches {
            if device.attribute(name)?.as_deref() != Some(value.as_str()) {
                return Ok(false);
            }
        }
        for (name, value) in &self.attribute.nomatches {
            if device.attribute(name)?.as_deref() == Some(value.as_str()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Subtree restriction for the parent filters: a mask over the snapshot
    /// marking every device that sits in the subtree of any stored parent
    /// (the parents themselves included). Computed up front so the
    /// per-device test is a lookup.
    fn parent_mask(&self, snapshot: &[DeviceRecord]) -> Option<Vec<bool>> {
        if self.parents.is_empty() {
            return None;
        }

        let mut tree: StableGraph<usize, ()> = StableGraph::new();
        let mut nodes: FxHashMap<&str, NodeIndex> = FxHashMap::default();
        for (index, record) in snapshot.iter().enumerate() {
            nodes.insert(record.syspath.as_str(), tree.add_node(index));
        }
        for record in snapshot {
            if let Some(parent) = record.parent.as_deref() {
                if let (Some(&from), Some(&to)) =
                    (nodes.get(parent), nodes.get(record.syspath.as_str()))
                {
                    tree.add_edge(from, to, ());
                }
            }
        }

        let mut mask = vec![false; snapshot.len()];
        for parent in &self.parents {
            let Some(&start) = nodes.get(parent.as_str()) else {
                continue;
            };
            let mut walk = Bfs::new(&tree, start);
            while let Some(node) = walk.next(&tree) {
                mask[tree[node]] = true;
            }
        }
        Some(mask)
    }
}

impl fmt::Display for MatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if !self.subsystem.matches.is_empty() {
            parts.push(format!(
                "subsystem in [{}]",
                self.subsystem.matches.iter().format(", ")
            ));
        }
        if !self.subsystem.nomatches.is_empty() {
            parts.push(format!(
                "subsystem not in [{}]",
                self.subsystem.nomatches.iter().format(", ")
            ));
        }
        if !self.sys_name.is_empty() {
            parts.push(format!("sys_name in [{}]", self.sys_name.iter().format(", ")));
        }
        if !self.property.matches.is_empty() {
            parts.push(format!("any property of {:?}", self.property.matches));
        }
        if !self.property.nomatches.is_empty() {
            parts.push(format!("no property of {:?}", self.property.nomatches));
        }
        if !self.attribute.matches.is_empty() {
            parts.push(format!("all attributes of {:?}", self.attribute.matches));
        }
        if !self.attribute.nomatches.is_empty() {
            parts.push(format!("no attribute of {:?}", self.attribute.nomatches));
        }
        if !self.tag.is_empty() {
            parts.push(format!("tags [{}]", self.tag.iter().format(", ")));
        }
        if !self.parents.is_empty() {
            parts.push(format!("under [{}]", self.parents.iter().format(", ")));
        }
        if parts.is_empty() {
            return f.write_str("unfiltered");
        }
        write!(f, "{}", parts.iter().format("; "))
    }
}

/// Query builder over one registry's device universe.
///
/// Obtained from [`Context::list_devices`]. Not thread-safe and not meant to
/// be mutated while an iteration borrowed from it is live; one enumerator
/// per concurrent query.
#[derive(Debug, Clone)]
pub struct Enumerator {
    context: Context,
    matches: MatchSet,
}

impl Enumerator {
    pub(crate) fn new(context: Context) -> Self {
        Enumerator {
            context,
            matches: MatchSet::default(),
        }
    }

    /// Keeps only devices in the given subsystem. Alternatives accumulate:
    /// repeated calls widen the acceptable set.
    pub fn match_subsystem(&mut self, value: impl Into<MatchValue>) -> &mut Self {
        self.matches
            .subsystem
            .matches
            .insert(value.into().canonical().into_owned());
        self
    }

    /// Excludes devices in the given subsystem. Exclusions accumulate: a
    /// surviving device is in none of them.
    pub fn nomatch_subsystem(&mut self, value: impl Into<MatchValue>) -> &mut Self {
        self.matches
            .subsystem
            .nomatches
            .insert(value.into().canonical().into_owned());
        self
    }

    /// Keeps only devices with the given system name. Alternatives
    /// accumulate.
    pub fn match_sys_name(&mut self, value: impl Into<MatchValue>) -> &mut Self {
        self.matches
            .sys_name
            .insert(value.into().canonical().into_owned());
        self
    }

    /// Keeps devices carrying the given property value. Repeated calls are
    /// alternatives: any one satisfied pair is enough, even across different
    /// keys.
    pub fn match_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MatchValue>,
    ) -> &mut Self {
        self.matches
            .property
            .matches
            .insert((key.into(), value.into().canonical().into_owned()));
        self
    }

    /// Excludes devices carrying the given property value.
    pub fn nomatch_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MatchValue>,
    ) -> &mut Self {
        self.matches
            .property
            .nomatches
            .insert((key.into(), value.into().canonical().into_owned()));
        self
    }

    /// Requires the given attribute value. Repeated calls are refinements:
    /// every pair must hold.
    pub fn match_attribute(
        &mut self,
        name: impl Into<String>,
        value: impl Into<MatchValue>,
    ) -> &mut Self {
        self.matches
            .attribute
            .matches
            .insert((name.into(), value.into().canonical().into_owned()));
        self
    }

    /// Excludes devices whose attribute has the given value. A device
    /// lacking the attribute survives; absence is not a match.
    pub fn nomatch_attribute(
        &mut self,
        name: impl Into<String>,
        value: impl Into<MatchValue>,
    ) -> &mut Self {
        self.matches
            .attribute
            .nomatches
            .insert((name.into(), value.into().canonical().into_owned()));
        self
    }

    /// Requires the given tag. Repeated calls are refinements: a device must
    /// carry every requested tag. Needs registry version 154.
    pub fn match_tag(&mut self, value: impl Into<MatchValue>) -> RegistryResult<&mut Self> {
        self.require_version("tag filters", TAG_MINIMUM_VERSION)?;
        self.matches
            .tag
            .insert(value.into().canonical().into_owned());
        Ok(self)
    }

    /// Restricts enumeration to the subtree of the given device, the device
    /// itself included. Repeated calls union their subtrees. Needs registry
    /// version 172. There is no no-match form; parent filtering restricts
    /// the walk rather than testing a predicate.
    pub fn match_parent(&mut self, parent: &Device) -> RegistryResult<&mut Self> {
        self.require_version("parent filters", PARENT_MINIMUM_VERSION)?;
        self.matches.parents.insert(parent.syspath().to_string());
        Ok(self)
    }

    /// Generic dispatcher: `subsystem`, `sys_name`, `tag`, and `parent` (by
    /// syspath) route to their dedicated filters, every other key adds one
    /// property filter. Only match polarity is expressible here. See also
    /// the [`match_many!`](crate::match_many) macro for keyword-argument
    /// syntax.
    pub fn match_many<K, V>(
        &mut self,
        filters: impl IntoIterator<Item = (K, V)>,
    ) -> RegistryResult<&mut Self>
    where
        K: AsRef<str>,
        V: Into<MatchValue>,
    {
        use anyhow::Context as _;

        for (key, value) in filters {
            let key = key.as_ref();
            let value = value.into();
            if !RESERVED_KEYS.contains(&key) {
                self.match_property(key, value);
                continue;
            }
            match key {
                "subsystem" => {
                    self.match_subsystem(value);
                }
                "sys_name" => {
                    self.match_sys_name(value);
                }
                "tag" => {
                    self.match_tag(value)?;
                }
                "parent" => {
                    let parent = self
                        .context
                        .device_from_syspath(&value.canonical())
                        .context("resolving the parent filter of a generic match")?;
                    self.match_parent(&parent)?;
                }
                _ => unreachable!(),
            }
        }
        Ok(self)
    }

    fn require_version(&self, feature: &'static str, required: u32) -> RegistryResult<()> {
        let actual = self.context.version();
        if actual < required {
            return Err(RegistryError::Unsupported {
                feature,
                required,
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// Evaluates the accumulated constraints lazily against the universe as
    /// it is right now. Each call takes a fresh snapshot, so re-scanning a
    /// live registry may see different devices.
    pub fn scan(&self) -> RegistryResult<Devices<'_>> {
        let snapshot = self.context.backend().enumerate()?;
        debug!(devices = snapshot.len(), filters = %self.matches, "scanning registry");
        let allowed = self.matches.parent_mask(&snapshot);
        Ok(Devices {
            enumerator: self,
            snapshot,
            allowed,
            seen: IndexSet::new(),
            position: 0,
            pending: None,
        })
    }
}

impl<'a> IntoIterator for &'a Enumerator {
    type Item = RegistryResult<Device>;
    type IntoIter = Devices<'a>;

    fn into_iter(self) -> Devices<'a> {
        match self.scan() {
            Ok(devices) => devices,
            Err(error) => Devices {
                enumerator: self,
                snapshot: Vec::new(),
                allowed: None,
                seen: IndexSet::new(),
                position: 0,
                pending: Some(error),
            },
        }
    }
}

/// Lazy sequence of matching devices, in the registry's natural order,
/// deduplicated by syspath. Evaluation failures are yielded in place;
/// devices already yielded stay valid.
#[derive(Debug)]
pub struct Devices<'a> {
    enumerator: &'a Enumerator,
    snapshot: Vec<DeviceRecord>,
    allowed: Option<Vec<bool>>,
    seen: IndexSet<String>,
    position: usize,
    pending: Option<anyhow::Error>,
}

impl Iterator for Devices<'_> {
    type Item = RegistryResult<Device>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.pending.take() {
            return Some(Err(error));
        }

        let matches = &self.enumerator.matches;
        while self.position < self.snapshot.len() {
            let index = self.position;
            self.position += 1;
            let record = &self.snapshot[index];

            if let Some(mask) = &self.allowed {
                if !mask[index] {
                    continue;
                }
            }
            // The universe never contains subsystem-less devices; they only
            // exist to link the tree together.
            if record.subsystem.is_none() {
                continue;
            }
            if !self.seen.insert(record.syspath.clone()) {
                continue;
            }
            if !matches.accepts_record(record) {
                trace!(syspath = %record.syspath, "rejected by record filters");
                continue;
            }

            let device =
                Device::from_record(self.enumerator.context.clone(), record.clone());
            match matches.accepts_attributes(&device) {
                Ok(true) => return Some(Ok(device)),
                Ok(false) => {
                    trace!(syspath = %record.syspath, "rejected by attribute filters");
                }
                Err(error) => return Some(Err(error)),
            }
        }
        None
    }
}
