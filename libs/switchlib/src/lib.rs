// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Control core of a cascaded signal-routing fabric.
//!
//! A fabric is a DAG of crossbar switches: each [`Matrix`] owns N inputs
//! and M outputs, and a non-leaf matrix treats another matrix's outputs as
//! its own inputs, so routing a source to an output may claim a chain of
//! intermediate outputs. The core answers two questions correctly under
//! contention: which sources are reachable at an output right now, and
//! which crossbars must be programmed and locked to realize
//! `source -> output` without disturbing routes already in use.
//!
//! Hardware actuation stays behind the narrow [`Driver`] seam; this crate
//! plans, claims, and bookkeeps. Every [`MatrixOutput`] carries a
//! reference-counted lock so an already-routed path can be shared (a
//! "mirror") and stays reserved until its last user releases it.
//! [`SourceGroup`] ties parallel matrices together: sources at the same
//! position in parallel groups are companions, and [`MatrixGroup`] routes
//! them to their preferred outputs alongside each primary selection.

pub mod core;

pub use core::{
    error::{Result, SwitchError},
    group::{MatrixGroup, SourceGroup},
    matrix::{AvailableSource, Driver, Matrix, MatrixInput},
    ports::MatrixOutput,
    registry::{get_source, list_sources, reset_sources},
    signals::{Sink, Source},
};
