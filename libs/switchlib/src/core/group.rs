// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Source grouping and coordinated companion routing
//!
//! Parallel matrices often switch different lanes of the same machines: a
//! video crossbar and a USB crossbar, say, where machine 3's video feed
//! and machine 3's USB lane should travel together. A [`SourceGroup`]
//! captures that by position (sources at the same index in different
//! groups are companions) and a [`MatrixGroup`] routes a primary
//! selection plus best-effort companion mirrors in one call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::error::{Result, SwitchError};
use super::matrix::Matrix;
use super::ports::MatrixOutput;
use super::signals::Source;

/// Parallel groups of signal sources keyed by position.
#[derive(Default)]
pub struct SourceGroup {
    /// Insertion order is significant: companion lookup locates a source
    /// in the first group that contains it.
    groups: Vec<(String, Vec<Option<Arc<Source>>>)>,
}

impl SourceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named group of sources. Slots may be empty; an empty slot
    /// never produces a companion.
    pub fn with_group(
        mut self,
        name: impl Into<String>,
        sources: Vec<Option<Arc<Source>>>,
    ) -> Self {
        self.groups.push((name.into(), sources));
        self
    }

    /// Bind every source in `group` to `output` as its preferred output,
    /// where that signal normally wants to appear when dragged along as a
    /// companion. Unknown group names are ignored.
    pub fn assign_output(&self, group: &str, output: &Arc<MatrixOutput>) {
        if let Some((_, sources)) = self.groups.iter().find(|(name, _)| name == group) {
            for source in sources.iter().flatten() {
                source.set_preferred_out(output.clone());
            }
        }
    }

    /// Bind preferred outputs for several groups at once.
    pub fn assign_outputs<'a, I>(&self, assignments: I)
    where
        I: IntoIterator<Item = (&'a str, Arc<MatrixOutput>)>,
    {
        for (group, output) in assignments {
            self.assign_output(group, &output);
        }
    }

    /// All sources occupying the same position as `source` in other
    /// groups.
    ///
    /// Empty when `source` belongs to no group. The result is unordered;
    /// callers must not depend on iteration order.
    pub fn get_companions(&self, source: &Arc<Source>) -> HashSet<Arc<Source>> {
        let position = self
            .groups
            .iter()
            .find_map(|(_, sources)| sources.iter().position(|slot| slot.as_ref() == Some(source)));
        let Some(idx) = position else {
            return HashSet::new();
        };
        let mut companions = HashSet::new();
        for (_, sources) in &self.groups {
            if let Some(Some(companion)) = sources.get(idx) {
                if companion != source {
                    companions.insert(companion.clone());
                }
            }
        }
        companions
    }
}

/// Coordinator over named matrices sharing one universe of sources.
pub struct MatrixGroup {
    signals: SourceGroup,
    matrices: HashMap<String, Arc<Matrix>>,
}

impl MatrixGroup {
    pub fn new(signals: SourceGroup) -> Self {
        Self {
            signals,
            matrices: HashMap::new(),
        }
    }

    /// Register a matrix under a name.
    pub fn with_matrix(mut self, name: impl Into<String>, matrix: Arc<Matrix>) -> Self {
        self.matrices.insert(name.into(), matrix);
        self
    }

    /// Route `src` to output `idx` of the named matrix, then route each
    /// companion of `src` to its preferred output.
    ///
    /// Companion routes are convenience mirrors, deliberately left
    /// unlocked so they never block a later primary selection. A companion
    /// without a preferred output, or whose preferred output is the port
    /// just programmed, is skipped. A companion that cannot be routed is a
    /// real failure and propagates.
    pub fn select(
        &self,
        matrix: &str,
        idx: usize,
        src: &Arc<Source>,
        no_companions: bool,
    ) -> Result<()> {
        let mat = self.matrices.get(matrix).ok_or_else(|| {
            SwitchError::UnroutableOutput(format!("no matrix named {matrix}"))
        })?;
        mat.select(idx, src)?;
        let mat_out = mat.outputs()[idx].clone();

        if no_companions {
            return Ok(());
        }
        for companion in self.signals.get_companions(src) {
            match companion.preferred_out() {
                Some(output) if !Arc::ptr_eq(&output, &mat_out) => {
                    tracing::debug!("routing companion {} to {}", companion, output);
                    output.select(&companion, true)?;
                }
                _ => tracing::debug!("skipping companion {}, no preferred output", companion),
            }
        }
        Ok(())
    }

    /// Output `idx` of the named matrix.
    pub fn get_output(&self, name: &str, idx: usize) -> Option<Arc<MatrixOutput>> {
        self.matrices.get(name).map(|m| m.outputs()[idx].clone())
    }

    /// Sources reachable at the named matrix. Empty for unknown names.
    pub fn available(&self, name: &str) -> HashSet<Arc<Source>> {
        self.matrices
            .get(name)
            .map(|m| m.available_sources())
            .unwrap_or_default()
    }
}
