// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Signal sources and sinks
//!
//! A [`Source`] is the identity of one physical signal leaf: a camera, a
//! host's video output, a USB lane. Identity is a fresh v4 UUID, stable for
//! the life of the object; everything else about the signal (resolution,
//! encoding, transport) is out of scope for the routing core.
//!
//! A [`Sink`] is anything that wants to hear that the signal carried by a
//! matrix output has changed underneath it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::ports::MatrixOutput;
use super::registry;

/// Identity of a physical signal leaf.
///
/// Sources compare and hash by UUID, so a source reachable over several
/// paths collapses to a single entry in `available_sources`.
pub struct Source {
    uuid: Uuid,
    name: String,
    preferred_out: Mutex<Option<Arc<MatrixOutput>>>,
}

impl Source {
    /// Create a source with a fresh UUID and record it in the process-wide
    /// registry.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let source = Arc::new(Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            preferred_out: Mutex::new(None),
        });
        registry::register_source(&source);
        source
    }

    /// Stable identity of this signal.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The output this signal normally wants to appear on, if one was
    /// assigned.
    pub fn preferred_out(&self) -> Option<Arc<MatrixOutput>> {
        self.preferred_out.lock().clone()
    }

    /// Bind the output this signal normally wants to appear on. Installed
    /// by [`SourceGroup::assign_output`](super::group::SourceGroup::assign_output)
    /// and consulted during companion routing.
    pub fn set_preferred_out(&self, output: Arc<MatrixOutput>) {
        *self.preferred_out.lock() = Some(output);
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for Source {}

impl std::hash::Hash for Source {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("uuid", &self.uuid)
            .finish()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Source({})", self.name)
    }
}

/// Downstream notification target of a [`MatrixOutput`].
///
/// Implementors are told when the signal identity on the watched output
/// changes; `None` means the output went dark.
pub trait Sink: Send + Sync {
    fn source_changed(&self, source: Option<Arc<Source>>);
}
