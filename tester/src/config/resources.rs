//! Resource Sets and Policies
//!
//! Parses resource specifications such as `network,largefile` or
//! `all,-gui` and decides which resources a suite may use.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use shared::ResourceName;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Set of enabled resource names
///
/// `all` is kept as an open-ended wildcard so resources that have no name yet
/// are enabled too; names removed with `-name` after `all` stay excluded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceSet {
    names: HashSet<ResourceName>,
    wildcard: bool,
    excluded: HashSet<ResourceName>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known resource plus the open-ended `all` wildcard
    pub fn all() -> Self {
        let mut set = Self::new();
        set.enable_all();
        set
    }

    pub fn from_names<I: IntoIterator<Item = ResourceName>>(names: I) -> Self {
        let mut set = Self::new();
        for name in names {
            set.insert(name);
        }
        set
    }

    /// Parse a comma-separated resource specification
    ///
    /// Entries are applied left to right: `all` enables everything, `none`
    /// clears the set, `-name` removes a resource (`-all` clears everything)
    /// and any other entry adds it.
    pub fn parse(spec: &str) -> HarnessResult<Self> {
        let mut set = Self::new();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry {
                "none" => set = Self::new(),
                ResourceName::ALL => set.enable_all(),
                removal if removal.starts_with('-') => {
                    let name = Self::parse_name(&removal[1..])?;
                    set.remove(&name);
                }
                name => {
                    let name = Self::parse_name(name)?;
                    set.insert(name);
                }
            }
        }

        Ok(set)
    }

    fn parse_name(raw: &str) -> HarnessResult<ResourceName> {
        ResourceName::new(raw).map_err(|e| HarnessError::config("resources", e.to_string()))
    }

    fn enable_all(&mut self) {
        self.wildcard = true;
        self.excluded.clear();
        self.names
            .extend(ResourceName::KNOWN.iter().filter_map(|known| ResourceName::new(*known).ok()));
    }

    pub fn insert(&mut self, name: ResourceName) {
        if name.is_all() {
            self.enable_all();
            return;
        }
        self.excluded.remove(&name);
        self.names.insert(name);
    }

    pub fn remove(&mut self, name: &ResourceName) {
        if name.is_all() {
            // Same as `none`
            *self = Self::new();
            return;
        }
        self.names.remove(name);
        if self.wildcard {
            self.excluded.insert(name.clone());
        }
    }

    /// Exact membership, ignoring the `all` wildcard
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Whether `name` is enabled, honouring the `all` wildcard
    pub fn enables(&self, name: &str) -> bool {
        if self.contains(name) {
            return true;
        }
        self.wildcard && !self.excluded.contains(name)
    }

    pub fn has_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && !self.wildcard
    }

    /// Explicitly named resources in sorted order
    pub fn names(&self) -> Vec<&ResourceName> {
        let mut names: Vec<_> = self.names.iter().collect();
        names.sort();
        names
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries = Vec::new();

        if self.wildcard {
            entries.push(ResourceName::ALL.to_string());
            let mut excluded: Vec<_> = self.excluded.iter().map(|n| format!("-{n}")).collect();
            excluded.sort();
            entries.extend(excluded);
            let mut extra: Vec<_> = self
                .names
                .iter()
                .filter(|n| !n.is_known())
                .map(ToString::to_string)
                .collect();
            extra.sort();
            entries.extend(extra);
        } else {
            entries.extend(self.names().into_iter().map(ToString::to_string));
        }

        write!(f, "{}", entries.join(","))
    }
}

impl FromStr for ResourceSet {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceSet {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceSet> for String {
    fn from(set: ResourceSet) -> Self {
        set.to_string()
    }
}

/// How resources are granted to tests
///
/// A runner driving the whole suite grants only what it was told to
/// (`Orchestrated`); a test module invoked directly grants everything except
/// an explicit deny-list (`Standalone`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResourcePolicy {
    Orchestrated { enabled: ResourceSet },
    Standalone { deny: ResourceSet },
}

impl ResourcePolicy {
    /// Orchestrated mode with nothing enabled
    pub fn minimal() -> Self {
        ResourcePolicy::Orchestrated {
            enabled: ResourceSet::new(),
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        match self {
            ResourcePolicy::Orchestrated { enabled } => enabled.enables(name),
            ResourcePolicy::Standalone { deny } => !deny.enables(name),
        }
    }

    pub fn is_orchestrated(&self) -> bool {
        matches!(self, ResourcePolicy::Orchestrated { .. })
    }
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        ResourcePolicy::Standalone {
            deny: ResourceSet::new(),
        }
    }
}

impl fmt::Display for ResourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePolicy::Orchestrated { enabled } if enabled.is_empty() => write!(f, "orchestrated (none enabled)"),
            ResourcePolicy::Orchestrated { enabled } => write!(f, "orchestrated ({enabled})"),
            ResourcePolicy::Standalone { deny } if deny.is_empty() => write!(f, "standalone (all enabled)"),
            ResourcePolicy::Standalone { deny } => write!(f, "standalone (denied: {deny})"),
        }
    }
}
