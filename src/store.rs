//! Object store - the local half of cross-process references.
//!
//! Objects sent to the peer by reference are kept here so the peer can name
//! them later (`{"rid": ..}`) and release them when done. Entries are keyed
//! by object identity: storing the same `Arc` twice bumps its count, while
//! two equal but distinct objects get separate entries.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::script::HostObjectRef;

struct Entry {
    object: HostObjectRef,
    refcount: usize,
}

/// Identity-keyed, reference-counted registry of host objects.
#[derive(Default)]
pub struct ObjectStore {
    entries: HashMap<String, Entry>,
}

/// Reference string for an object: its address, in decimal.
fn identity(object: &HostObjectRef) -> String {
    (Arc::as_ptr(object) as *const () as usize).to_string()
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `object` alive and return its reference.
    pub fn store(&mut self, object: HostObjectRef) -> String {
        let reference = identity(&object);
        let entry = self
            .entries
            .entry(reference.clone())
            .or_insert(Entry { object, refcount: 0 });
        entry.refcount += 1;
        debug!(reference = %reference, refcount = entry.refcount, "stored object");
        reference
    }

    /// Look up a stored object.
    pub fn retrieve(&self, reference: &str) -> Result<HostObjectRef> {
        self.entries
            .get(reference)
            .map(|entry| Arc::clone(&entry.object))
            .ok_or_else(|| BridgeError::UnknownReference(reference.to_string()))
    }

    /// Drop one reference; the object is forgotten when none remain.
    pub fn release(&mut self, reference: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(reference)
            .ok_or_else(|| BridgeError::UnknownReference(reference.to_string()))?;
        entry.refcount -= 1;
        debug!(reference = %reference, refcount = entry.refcount, "released object");
        if entry.refcount == 0 {
            self.entries.remove(reference);
        }
        Ok(())
    }

    /// Current count for a reference, 0 if absent.
    pub fn refcount(&self, reference: &str) -> usize {
        self.entries.get(reference).map_or(0, |entry| entry.refcount)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(reference, entry)| (reference, entry.refcount)),
            )
            .finish()
    }
}
