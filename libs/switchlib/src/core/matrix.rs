// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Crossbar matrices and cascaded route planning
//!
//! A [`Matrix`] is one crossbar switch: N inputs, M outputs, any input
//! routable to any output. An input is either a raw [`Source`] leaf or an
//! output of another matrix, so matrices compose into a routing fabric: a
//! DAG in which reaching a source at the root may mean claiming a chain of
//! upstream outputs.
//!
//! Routing is two-phase: [`Matrix::iter_sources`] enumerates every
//! candidate route to every reachable source, then selection picks the
//! shortest one, recursively claims the upstream outputs along it, and
//! programs the local crossbar through the [`Driver`] seam. Upstream
//! signal changes fan back down through installed per-input sinks without
//! touching any hardware.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::error::{Result, SwitchError};
use super::ports::MatrixOutput;
use super::signals::{Sink, Source};

/// Narrow hardware seam: connect `input_idx` to `output_idx` on the
/// physical crossbar.
///
/// Synchronous and idempotent at the hardware layer. Failures are
/// implementation-defined; the core treats them as fatal for the current
/// select and never retries.
pub trait Driver: Send + Sync {
    fn program(&self, output_idx: usize, input_idx: usize) -> anyhow::Result<()>;
}

/// One input slot of a matrix: a raw signal leaf, or another matrix's
/// output wired in as a cascade.
#[derive(Clone)]
pub enum MatrixInput {
    Signal(Arc<Source>),
    Output(Arc<MatrixOutput>),
}

impl MatrixInput {
    /// The signal currently observable through this input, if any.
    pub fn source(&self) -> Option<Arc<Source>> {
        match self {
            MatrixInput::Signal(source) => Some(source.clone()),
            MatrixInput::Output(output) => output.source(),
        }
    }
}

impl From<Arc<Source>> for MatrixInput {
    fn from(source: Arc<Source>) -> Self {
        MatrixInput::Signal(source)
    }
}

impl From<Arc<MatrixOutput>> for MatrixInput {
    fn from(output: Arc<MatrixOutput>) -> Self {
        MatrixInput::Output(output)
    }
}

impl fmt::Debug for MatrixInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixInput::Signal(source) => write!(f, "Signal({})", source.name()),
            MatrixInput::Output(output) => write!(f, "Output({output})"),
        }
    }
}

/// A candidate route yielded during source enumeration.
#[derive(Clone, Debug)]
pub struct AvailableSource {
    /// Input slot the route enters this matrix through.
    pub input_idx: usize,
    /// Matrix hops between this matrix and the raw source. Zero means the
    /// upstream output is locked and the route is fixed as-is.
    pub path_len: usize,
    /// The input itself: the leaf, or the upstream output to claim.
    pub path: MatrixInput,
    /// The source reachable over this route.
    pub source: Arc<Source>,
}

/// Sink installed on an upstream output wired into input slot `idx`;
/// relays signal changes back into the owning matrix.
struct InputSlot {
    matrix: Weak<Matrix>,
    idx: usize,
}

impl Sink for InputSlot {
    fn source_changed(&self, source: Option<Arc<Source>>) {
        if let Some(matrix) = self.matrix.upgrade() {
            matrix.input_changed(self.idx, source);
        }
    }
}

/// One crossbar switch in the fabric.
pub struct Matrix {
    name: String,
    driver: Arc<dyn Driver>,
    inputs: Mutex<Vec<Option<MatrixInput>>>,
    outputs: Vec<Arc<MatrixOutput>>,
    /// output_idx -> input_idx last programmed for that output. Entries
    /// are overwritten on reselect, never pruned on release; a stale entry
    /// is inert because release is guarded by the lock counter.
    current: Mutex<HashMap<usize, usize>>,
}

impl Matrix {
    /// Build a crossbar over `inputs` with `nr_outputs` output ports.
    ///
    /// Every input that is itself a [`MatrixOutput`] is bound back to this
    /// matrix, so a later reprogram of that upstream output fans its new
    /// signal down through whichever of our outputs route through it.
    pub fn new(
        name: impl Into<String>,
        driver: Arc<dyn Driver>,
        inputs: Vec<Option<MatrixInput>>,
        nr_outputs: usize,
    ) -> Arc<Self> {
        let name = name.into();
        let matrix = Arc::new_cyclic(|weak: &Weak<Matrix>| {
            let outputs = (0..nr_outputs)
                .map(|idx| Arc::new(MatrixOutput::new(weak.clone(), idx)))
                .collect();
            Self {
                name,
                driver,
                inputs: Mutex::new(inputs),
                outputs,
                current: Mutex::new(HashMap::new()),
            }
        });
        for (idx, input) in matrix.inputs.lock().iter().enumerate() {
            if let Some(MatrixInput::Output(output)) = input {
                output.connected_to(Arc::new(InputSlot {
                    matrix: Arc::downgrade(&matrix),
                    idx,
                }));
            }
        }
        matrix
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output ports of this crossbar.
    pub fn outputs(&self) -> &[Arc<MatrixOutput>] {
        &self.outputs
    }

    /// Every source currently reachable through this matrix's inputs, as
    /// candidate route records.
    ///
    /// Inputs are walked in ascending index order and upstream records come
    /// back depth-first, so the sequence is deterministic: the first record
    /// of a given length is the lowest-numbered route. A locked upstream
    /// output is not recursed into; its route is fixed, so it is offered
    /// at `path_len` 0 carrying whatever signal the existing lock holds.
    pub fn iter_sources(&self) -> Vec<AvailableSource> {
        let inputs = self.inputs.lock().clone();
        let mut records = Vec::new();
        for (idx, input) in inputs.iter().enumerate() {
            match input {
                Some(MatrixInput::Signal(source)) => {
                    records.push(AvailableSource {
                        input_idx: idx,
                        path_len: 1,
                        path: MatrixInput::Signal(source.clone()),
                        source: source.clone(),
                    });
                }
                Some(MatrixInput::Output(output)) => {
                    if output.locked() {
                        let Some(source) = output.source() else {
                            tracing::debug!(
                                "{}: input {} locked with no signal, skipping",
                                self,
                                idx
                            );
                            continue;
                        };
                        tracing::debug!(
                            "{}: input {} locked, offering {} in place",
                            self,
                            idx,
                            source.uuid()
                        );
                        records.push(AvailableSource {
                            input_idx: idx,
                            path_len: 0,
                            path: MatrixInput::Output(output.clone()),
                            source,
                        });
                    } else if let Some(upstream) = output.matrix() {
                        for record in upstream.iter_sources() {
                            records.push(AvailableSource {
                                input_idx: idx,
                                path_len: record.path_len + 1,
                                path: MatrixInput::Output(output.clone()),
                                source: record.source,
                            });
                        }
                    }
                }
                None => {}
            }
        }
        records
    }

    /// The deduplicated set of sources reachable at this matrix.
    pub fn available_sources(&self) -> HashSet<Arc<Source>> {
        self.iter_sources()
            .into_iter()
            .map(|record| record.source)
            .collect()
    }

    /// Route `source` to output `idx`, propagating up the fabric as
    /// necessary.
    ///
    /// The output itself is left unlocked; callers that need the route
    /// held go through [`MatrixOutput::select`] with its default claim.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not a valid output index.
    pub fn select(&self, idx: usize, source: &Arc<Source>) -> Result<()> {
        self.outputs[idx].select(source, true)
    }

    /// Plan and commit a route for `source` on output `idx`.
    ///
    /// Order matters: the previous upstream reservation for this output is
    /// released first (its resources may be exactly what the new route
    /// needs), then the shortest candidate route is claimed upstream, then
    /// the local crossbar is programmed.
    pub(crate) fn realize(&self, idx: usize, source: &Arc<Source>) -> Result<()> {
        tracing::info!("{}: assigning output {} to {}", self, idx, source.uuid());
        self.release(idx);

        let mut best: Option<AvailableSource> = None;
        for candidate in self.iter_sources() {
            if candidate.source != *source {
                continue;
            }
            // Strict `<` keeps the first-enumerated route on ties, i.e.
            // the lowest input index wins.
            match &best {
                Some(chosen) if candidate.path_len >= chosen.path_len => {}
                _ => best = Some(candidate),
            }
        }
        let Some(route) = best else {
            return Err(SwitchError::UnroutableOutput(format!(
                "{}: {} is not routable to output {}",
                self,
                source.uuid(),
                idx
            )));
        };

        if let MatrixInput::Output(upstream) = &route.path {
            tracing::info!(
                "{}: using {} (path len {}) for output {}",
                self,
                upstream,
                route.path_len,
                idx
            );
            upstream.select(source, false)?;
        }
        self.driver.program(idx, route.input_idx)?;
        self.current.lock().insert(idx, route.input_idx);
        Ok(())
    }

    /// Release the upstream reservation feeding output `idx`, if any.
    ///
    /// Missing bookkeeping, a raw-source input in the routed slot, or an
    /// already-free upstream are not errors: releasing an output that holds
    /// no upstream resources is a no-op, so a failed select can always be
    /// followed by a reselect.
    pub fn release(&self, idx: usize) {
        let Some(input_idx) = self.current.lock().get(&idx).copied() else {
            tracing::debug!("{}: output {} has no routed input to release", self, idx);
            return;
        };
        let input = self.inputs.lock().get(input_idx).cloned().flatten();
        match input {
            Some(MatrixInput::Output(upstream)) => match upstream.release() {
                Ok(()) => tracing::debug!("{}: released {}", self, upstream),
                Err(err) => tracing::debug!("{}: skipping release: {}", self, err),
            },
            _ => tracing::debug!(
                "{}: output {} is fed by a leaf input, nothing to release",
                self,
                idx
            ),
        }
    }

    /// Replace the input found at slot `idx` and propagate the new signal
    /// to every output currently routed through it.
    ///
    /// No crossbar is reprogrammed: the physical path is unchanged, only
    /// the identity of the signal on it has. A newly plugged matrix output
    /// is bound back to this matrix so its own later changes keep flowing
    /// here.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not a valid input index.
    pub fn replug_input(self: &Arc<Self>, idx: usize, input: Option<MatrixInput>) {
        let effective = input.as_ref().and_then(|new| new.source());
        if let Some(MatrixInput::Output(output)) = &input {
            output.connected_to(Arc::new(InputSlot {
                matrix: Arc::downgrade(self),
                idx,
            }));
        }
        self.inputs.lock()[idx] = input;
        self.input_changed(idx, effective);
    }

    /// Fan an upstream signal change out to every output routed through
    /// input `idx`.
    pub(crate) fn input_changed(&self, idx: usize, source: Option<Arc<Source>>) {
        let routed: Vec<usize> = self
            .current
            .lock()
            .iter()
            .filter(|&(_, &input_idx)| input_idx == idx)
            .map(|(&output_idx, _)| output_idx)
            .collect();
        for output_idx in routed {
            self.outputs[output_idx].source_changed(source.clone());
        }
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("name", &self.name)
            .field("inputs", &self.inputs.lock().len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}
