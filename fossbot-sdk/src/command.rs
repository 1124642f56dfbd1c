//! Immutable name → handler tables.
//!
//! Built once at startup with [`CommandTableBuilder`] and shared by
//! reference afterwards. Lookups are exact and case-sensitive.

use std::collections::HashMap;

struct Entry<H> {
    handler: H,
    description: String,
}

/// Read-only mapping from a verb or bot command name to its handler.
pub struct CommandTable<H> {
    entries: HashMap<String, Entry<H>>,
}

impl<H> CommandTable<H> {
    pub fn builder() -> CommandTableBuilder<H> {
        CommandTableBuilder {
            entries: HashMap::new(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&H> {
        self.entries.get(name).map(|e| &e.handler)
    }

    /// `(name, description)` pairs sorted by name, for help listings.
    pub fn describe(&self) -> Vec<(&str, &str)> {
        let mut list: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(name, e)| (name.as_str(), e.description.as_str()))
            .collect();
        list.sort_unstable_by_key(|(name, _)| *name);
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H> std::fmt::Debug for CommandTable<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.describe().iter().map(|(name, _)| name))
            .finish()
    }
}

pub struct CommandTableBuilder<H> {
    entries: HashMap<String, Entry<H>>,
}

impl<H> CommandTableBuilder<H> {
    /// Register `handler` under `name`. A later registration of the same
    /// name replaces the earlier one.
    pub fn command(mut self, name: &str, description: &str, handler: H) -> Self {
        let previous = self.entries.insert(
            name.to_string(),
            Entry {
                handler,
                description: description.to_string(),
            },
        );
        if previous.is_some() {
            tracing::warn!(command = name, "Command registered twice, keeping the last one");
        }
        self
    }

    /// Names registered so far, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(self) -> CommandTable<H> {
        CommandTable {
            entries: self.entries,
        }
    }
}
