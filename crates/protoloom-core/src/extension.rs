//! Extension lookup during parsing.
//!
//! A registry maps `(extended message, field number)` to the extension
//! declared for it. Registration only ever appends; lookups take a read lock,
//! so a reader sees an entry either fully registered or not at all.

use crate::descriptor::{DescriptorGraph, FieldDescriptor, FileDescriptor, MessageDescriptor};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Entries {
    /// Extended message full name -> number -> extension
    by_extendee: HashMap<String, BTreeMap<i32, FieldDescriptor>>,
    by_name: HashMap<String, FieldDescriptor>,
}

/// Append-only mapping from `(extended type, field number)` to extensions
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    entries: RwLock<Entries>,
}

static EMPTY: OnceLock<ExtensionRegistry> = OnceLock::new();

impl ExtensionRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A shared registry with no entries, for parsing without extensions
    pub fn empty() -> &'static ExtensionRegistry {
        EMPTY.get_or_init(ExtensionRegistry::new)
    }

    /// Creates a registry holding every extension declared in `graph`
    pub fn from_graph(graph: &DescriptorGraph) -> Result<Self> {
        let registry = Self::new();
        registry.register_all(graph)?;
        Ok(registry)
    }

    /// Registers one extension.
    ///
    /// Registering the same extension again is a no-op; a different extension
    /// claiming the same number on the same type is a `DuplicateSymbol`.
    pub fn register(&self, extension: &FieldDescriptor) -> Result<()> {
        if !extension.is_extension() {
            return Err(Error::invalid_descriptor(format!(
                "'{}' is not an extension",
                extension.full_name()
            )));
        }
        let extendee = extension.containing_type();
        let mut entries = self.entries.write();

        let existing = entries
            .by_extendee
            .get(extendee.full_name())
            .and_then(|numbers| numbers.get(&extension.number()));
        match existing {
            Some(existing) if existing == extension => return Ok(()),
            Some(existing) => {
                return Err(Error::DuplicateSymbol {
                    name: format!(
                        "{} (extension {} of '{}', already taken by '{}')",
                        extension.full_name(),
                        extension.number(),
                        extendee.full_name(),
                        existing.full_name()
                    ),
                })
            }
            None => {}
        }

        entries
            .by_extendee
            .entry(extendee.full_name().to_string())
            .or_default()
            .insert(extension.number(), extension.clone());
        entries
            .by_name
            .insert(extension.full_name().to_string(), extension.clone());

        debug!(
            extension = extension.full_name(),
            extendee = extendee.full_name(),
            number = extension.number(),
            "registered extension"
        );
        Ok(())
    }

    /// Registers the extensions declared in `file`, at file and message scope
    pub fn register_file(&self, file: &FileDescriptor) -> Result<()> {
        let graph = file.graph();
        for extension in graph.all_extensions() {
            if extension.file() == *file {
                self.register(&extension)?;
            }
        }
        Ok(())
    }

    /// Registers every extension in `graph`
    pub fn register_all(&self, graph: &DescriptorGraph) -> Result<()> {
        graph
            .all_extensions()
            .try_for_each(|extension| self.register(&extension))
    }

    /// Extension of `extendee` with `number`, if registered
    pub fn find_by_number(&self, extendee: &MessageDescriptor, number: i32) -> Option<FieldDescriptor> {
        let entries = self.entries.read();
        let extension = entries
            .by_extendee
            .get(extendee.full_name())?
            .get(&number)?;
        // Same name in an unrelated graph is a different type
        (extension.containing_type() == *extendee).then(|| extension.clone())
    }

    /// Extension by fully-qualified name
    pub fn find_by_name(&self, full_name: &str) -> Option<FieldDescriptor> {
        let full_name = full_name.strip_prefix('.').unwrap_or(full_name);
        self.entries.read().by_name.get(full_name).cloned()
    }

    /// Registered extensions of `extendee`, by number
    pub fn extensions_of(&self, extendee: &MessageDescriptor) -> Vec<FieldDescriptor> {
        self.entries
            .read()
            .by_extendee
            .get(extendee.full_name())
            .map(|numbers| {
                numbers
                    .values()
                    .filter(|extension| extension.containing_type() == *extendee)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of registered extensions
    pub fn len(&self) -> usize {
        self.entries.read().by_name.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
