// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Matrix output ports
//!
//! A [`MatrixOutput`] is one output port of a crossbar. It holds the source
//! currently programmed onto it, a reference-counted lock counting the live
//! users of the routed path, and an optional downstream [`Sink`] fed when
//! the signal identity on the port changes.
//!
//! The lock is a counting semaphore rather than a binary flag: when a
//! parent matrix routes two of its own outputs through the same upstream
//! port (a mirror), the port must stay reserved until both users release
//! it. The counter is atomic so independent threads sharing a port cannot
//! corrupt the count.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use super::error::{Result, SwitchError};
use super::matrix::Matrix;
use super::signals::{Sink, Source};

pub struct MatrixOutput {
    owner: Weak<Matrix>,
    idx: usize,
    source: Mutex<Option<Arc<Source>>>,
    sem: AtomicI64,
    downstream: Mutex<Option<Arc<dyn Sink>>>,
}

impl MatrixOutput {
    pub(crate) fn new(owner: Weak<Matrix>, idx: usize) -> Self {
        Self {
            owner,
            idx,
            source: Mutex::new(None),
            sem: AtomicI64::new(0),
            downstream: Mutex::new(None),
        }
    }

    /// Index of this port on its owning matrix.
    pub fn index(&self) -> usize {
        self.idx
    }

    /// The owning matrix, while it is alive.
    pub fn matrix(&self) -> Option<Arc<Matrix>> {
        self.owner.upgrade()
    }

    /// True while at least one user holds a claim on this port.
    pub fn locked(&self) -> bool {
        self.sem.load(Ordering::Acquire) > 0
    }

    /// Number of live users of the routed path.
    pub fn lock_count(&self) -> i64 {
        self.sem.load(Ordering::Acquire)
    }

    /// The source currently programmed onto this port, if any.
    pub fn source(&self) -> Option<Arc<Source>> {
        self.source.lock().clone()
    }

    /// Identity of the signal currently on this port/cable.
    pub fn uuid(&self) -> Option<Uuid> {
        self.source.lock().as_ref().map(|s| s.uuid())
    }

    /// Install the downstream notification target. Called by a parent
    /// matrix when this port is wired up as one of its inputs.
    pub fn connected_to(&self, sink: Arc<dyn Sink>) {
        *self.downstream.lock() = Some(sink);
    }

    /// Select `src` onto this port, claiming it unless `nolock`.
    ///
    /// If `src` is already the signal on this port, the routed path is
    /// shared as-is (a mirror): nothing is reprogrammed, and a claim, when
    /// taken, counts one more user of the existing path. Otherwise the
    /// owning matrix realizes the route, which may claim outputs all the
    /// way up the fabric.
    ///
    /// Fails with [`SwitchError::LockedOutput`] when the port carries a
    /// different signal and someone still holds it.
    pub fn select(&self, src: &Arc<Source>, nolock: bool) -> Result<()> {
        if self.uuid() != Some(src.uuid()) {
            if self.locked() {
                return Err(SwitchError::LockedOutput(format!("{self} is in use")));
            }
            let matrix = self.owner.upgrade().ok_or_else(|| {
                SwitchError::UnroutableOutput(format!("{self}: owning matrix is gone"))
            })?;
            matrix.realize(self.idx, src)?;
            self.source_changed(Some(src.clone()));
        }
        if !nolock {
            self.claim();
        }
        Ok(())
    }

    /// Claim a lock on the port.
    pub fn claim(&self) {
        self.sem.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one claim on the port.
    ///
    /// The upstream reservation feeding this port is released once the last
    /// claim goes. Unbalanced releases fail with
    /// [`SwitchError::AlreadyUnlocked`] and leave the count at zero.
    pub fn release(&self) -> Result<()> {
        let prev = self.sem.fetch_sub(1, Ordering::AcqRel);
        if prev <= 0 {
            // Recover the counter before reporting.
            self.sem.fetch_add(1, Ordering::AcqRel);
            return Err(SwitchError::AlreadyUnlocked(self.to_string()));
        }
        if prev == 1 {
            if let Some(matrix) = self.owner.upgrade() {
                matrix.release(self.idx);
            }
        }
        Ok(())
    }

    /// Record the new signal on this port and fan it out downstream.
    ///
    /// The physical route is untouched; only the identity of what the
    /// route carries has changed.
    pub(crate) fn source_changed(&self, source: Option<Arc<Source>>) {
        let changed = {
            let mut current = self.source.lock();
            if current.as_ref().map(|s| s.uuid()) != source.as_ref().map(|s| s.uuid()) {
                *current = source.clone();
                true
            } else {
                false
            }
        };
        if changed {
            let sink = self.downstream.lock().clone();
            if let Some(sink) = sink {
                sink.source_changed(source);
            }
        }
    }
}

impl fmt::Display for MatrixOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner.upgrade() {
            Some(matrix) => write!(f, "{}.outputs[{}]", matrix.name(), self.idx),
            None => write!(f, "<detached>.outputs[{}]", self.idx),
        }
    }
}

impl fmt::Debug for MatrixOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixOutput")
            .field("idx", &self.idx)
            .field("locked", &self.locked())
            .field("source", &self.source.lock().as_ref().map(|s| s.name().to_owned()))
            .finish()
    }
}
