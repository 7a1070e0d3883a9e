// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Routing behavior across cascaded crossbars: shortest-path selection,
//! claim/release bookkeeping up the fabric, mirrors, and replug
//! propagation.

use std::sync::Arc;

use parking_lot::Mutex;
use switchlib::{Driver, Matrix, MatrixInput, Source, SwitchError};

/// Records every `program` call so tests can assert routing decisions.
struct RecordingDriver {
    calls: Mutex<Vec<(usize, usize)>>,
}

impl RecordingDriver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn last(&self) -> Option<(usize, usize)> {
        self.calls.lock().last().copied()
    }

    fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Driver for RecordingDriver {
    fn program(&self, output_idx: usize, input_idx: usize) -> anyhow::Result<()> {
        self.calls.lock().push((output_idx, input_idx));
        Ok(())
    }
}

fn leaf_inputs(sources: &[Arc<Source>]) -> Vec<Option<MatrixInput>> {
    sources
        .iter()
        .map(|s| Some(MatrixInput::from(s.clone())))
        .collect()
}

fn cascade_inputs(outputs: &[&Arc<switchlib::MatrixOutput>]) -> Vec<Option<MatrixInput>> {
    outputs
        .iter()
        .map(|o| Some(MatrixInput::from((*o).clone())))
        .collect()
}

fn locked_outputs(matrix: &Matrix) -> usize {
    matrix.outputs().iter().filter(|o| o.locked()).count()
}

/// Two leaf crossbars feeding one root. `sources1[1]` is shared between
/// both leaves, so it is reachable over four distinct paths.
struct TwoLevel {
    sources1: Vec<Arc<Source>>,
    sources2: Vec<Arc<Source>>,
    m1: Arc<Matrix>,
    m2: Arc<Matrix>,
    root: Arc<Matrix>,
    d1: Arc<RecordingDriver>,
    d2: Arc<RecordingDriver>,
    d_root: Arc<RecordingDriver>,
}

fn two_level() -> TwoLevel {
    let sources1 = vec![Source::new("s1-0"), Source::new("s1-1"), Source::new("s1-2")];
    let d1 = RecordingDriver::new();
    let m1 = Matrix::new("m1", d1.clone(), leaf_inputs(&sources1), 2);

    let sources2 = vec![sources1[1].clone(), Source::new("s2-0")];
    let d2 = RecordingDriver::new();
    let m2 = Matrix::new("m2", d2.clone(), leaf_inputs(&sources2), 2);

    let d_root = RecordingDriver::new();
    let inputs = m1
        .outputs()
        .iter()
        .chain(m2.outputs())
        .map(|o| Some(MatrixInput::from(o.clone())))
        .collect();
    let root = Matrix::new("root", d_root.clone(), inputs, 3);

    TwoLevel {
        sources1,
        sources2,
        m1,
        m2,
        root,
        d1,
        d2,
        d_root,
    }
}

/// Claim both m1 outputs: output 0 carries `sources1[1]`, output 1 carries
/// `sources1[0]`.
fn tie_up_m1(f: &TwoLevel) {
    f.root.select(0, &f.sources1[1]).unwrap();
    assert_eq!(f.d_root.last(), Some((0, 0)));
    assert_eq!(f.d1.last(), Some((0, 1)));
    f.root.select(1, &f.sources1[0]).unwrap();
    assert_eq!(f.d_root.last(), Some((1, 1)));
    assert_eq!(f.d1.last(), Some((1, 0)));
}

#[test]
fn test_available_sources_deduplicate_shared_sources() {
    let f = two_level();
    let available = f.root.available_sources();
    // sources1 plus the one source unique to m2; the shared source counts
    // once even though four paths reach it.
    assert_eq!(available.len(), 4);
    for s in f.sources1.iter().chain([&f.sources2[1]]) {
        assert!(available.contains(s));
    }
}

#[test]
fn test_iter_sources_covers_the_cascade_at_uniform_depth() {
    let f = two_level();
    let records = f.root.iter_sources();
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r.path_len == 2));
}

#[test]
fn test_selecting_at_the_root_selects_at_the_leaf() {
    let f = two_level();
    f.root.select(0, &f.sources1[1]).unwrap();
    // Lowest input index wins among the four equal-length paths, so the
    // route runs through m1's first output.
    assert_eq!(f.d_root.last(), Some((0, 0)));
    assert_eq!(f.d1.last(), Some((0, 1)));
    assert_eq!(f.d2.count(), 0);
    assert_eq!(f.root.outputs()[0].source().unwrap(), f.sources1[1]);
}

#[test]
fn test_second_selection_does_not_reuse_a_claimed_path() {
    let f = two_level();
    tie_up_m1(&f);
    assert_eq!(f.m1.outputs()[0].lock_count(), 1);
    assert_eq!(f.m1.outputs()[1].lock_count(), 1);
}

#[test]
fn test_unroutable_when_every_upstream_is_reserved() {
    let f = two_level();
    tie_up_m1(&f);
    // sources1[2] exists only behind m1, and both m1 outputs are claimed
    // on other signals.
    let err = f.root.select(2, &f.sources1[2]).unwrap_err();
    assert!(matches!(err, SwitchError::UnroutableOutput(_)));
}

#[test]
fn test_reselecting_swaps_resources() {
    let f = two_level();
    tie_up_m1(&f);
    // Reselecting output 1 releases its old claim on m1 first, freeing
    // the leaf output the new route needs.
    f.root.select(1, &f.sources1[2]).unwrap();
    assert_eq!(f.d1.last(), Some((1, 2)));
    assert_eq!(f.d_root.last(), Some((1, 1)));
    assert_eq!(f.root.outputs()[1].source().unwrap(), f.sources1[2]);
}

#[test]
fn test_reselecting_releases_unused_resources() {
    let f = two_level();
    tie_up_m1(&f);
    f.root.select(1, &f.sources2[1]).unwrap();
    assert_eq!(f.d2.last(), Some((0, 1)));
    assert_eq!(f.d_root.last(), Some((1, 2)));
    assert_eq!(locked_outputs(&f.m1), 1);
    assert_eq!(locked_outputs(&f.m2), 1);
}

#[test]
fn test_mirror_claims_the_existing_path() {
    let f = two_level();
    tie_up_m1(&f);
    let d1_calls = f.d1.count();
    // sources1[0] is already live on m1's second output; selecting it on
    // another root output shares that path instead of reprogramming m1.
    f.root.select(0, &f.sources1[0]).unwrap();
    assert!(!f.m1.outputs()[0].locked());
    assert_eq!(f.m1.outputs()[1].lock_count(), 2);
    assert_eq!(f.d1.count(), d1_calls);
    assert_eq!(f.d_root.last(), Some((0, 1)));
}

#[test]
fn test_mirror_swap_frees_resources_for_new_routes() {
    let f = two_level();
    tie_up_m1(&f);
    f.root.select(0, &f.sources1[0]).unwrap();
    // The mirror released m1's first output, so the leaf-only source is
    // routable again.
    f.root.select(2, &f.sources1[2]).unwrap();
    assert_eq!(f.d1.last(), Some((0, 2)));
    assert_eq!(f.d_root.last(), Some((2, 0)));
    assert_eq!(f.root.outputs()[2].source().unwrap(), f.sources1[2]);
}

/// Three levels are needed to show recursion claims and releases whole
/// chains, not just the first hop.
struct ThreeLevel {
    sources1: Vec<Arc<Source>>,
    sources2: Vec<Arc<Source>>,
    sources3: Vec<Arc<Source>>,
    m1: Arc<Matrix>,
    m2: Arc<Matrix>,
    m3: Arc<Matrix>,
    n1: Arc<Matrix>,
    n2: Arc<Matrix>,
    root: Arc<Matrix>,
    d1: Arc<RecordingDriver>,
    dn1: Arc<RecordingDriver>,
    d_root: Arc<RecordingDriver>,
}

fn three_level() -> ThreeLevel {
    let sources1 = vec![Source::new("s1-0"), Source::new("s1-1"), Source::new("s1-2")];
    let d1 = RecordingDriver::new();
    let m1 = Matrix::new("m1", d1.clone(), leaf_inputs(&sources1), 2);

    let sources2 = vec![sources1[1].clone(), Source::new("s2-0")];
    let m2 = Matrix::new("m2", RecordingDriver::new(), leaf_inputs(&sources2), 2);

    let sources3 = vec![Source::new("s3-0"), Source::new("s3-1")];
    let m3 = Matrix::new("m3", RecordingDriver::new(), leaf_inputs(&sources3), 2);

    let dn1 = RecordingDriver::new();
    let n1 = Matrix::new(
        "n1",
        dn1.clone(),
        cascade_inputs(&[&m1.outputs()[0], &m1.outputs()[1], &m2.outputs()[0]]),
        2,
    );
    let n2 = Matrix::new(
        "n2",
        RecordingDriver::new(),
        cascade_inputs(&[&m3.outputs()[0], &m3.outputs()[1], &m2.outputs()[1]]),
        2,
    );

    let d_root = RecordingDriver::new();
    let inputs = n1
        .outputs()
        .iter()
        .chain(n2.outputs())
        .map(|o| Some(MatrixInput::from(o.clone())))
        .collect();
    let root = Matrix::new("root", d_root.clone(), inputs, 3);

    ThreeLevel {
        sources1,
        sources2,
        sources3,
        m1,
        m2,
        m3,
        n1,
        n2,
        root,
        d1,
        dn1,
        d_root,
    }
}

#[test]
fn test_selecting_recursively_claims_the_chain() {
    let f = three_level();
    f.root.select(0, &f.sources1[0]).unwrap();
    assert_eq!(locked_outputs(&f.m1), 1);
    assert_eq!(locked_outputs(&f.n1), 1);
}

#[test]
fn test_reselecting_recursively_releases_the_chain() {
    let f = three_level();
    f.root.select(0, &f.sources1[0]).unwrap();
    f.root.select(0, &f.sources3[0]).unwrap();
    assert_eq!(locked_outputs(&f.n1), 0);
    assert_eq!(locked_outputs(&f.m1), 0);
    // The new chain holds exactly one output on each hop.
    assert_eq!(locked_outputs(&f.n2), 1);
    assert_eq!(locked_outputs(&f.m3), 1);
}

#[test]
fn test_upstream_replug_cascades_to_the_root_without_reprogramming() {
    let f = three_level();
    f.root.select(0, &f.sources1[0]).unwrap();
    assert_eq!(
        f.root.outputs()[0].uuid(),
        Some(f.sources1[0].uuid())
    );
    let (c1, cn1, c_root) = (f.d1.count(), f.dn1.count(), f.d_root.count());

    f.m1.replug_input(0, Some(MatrixInput::from(f.sources3[1].clone())));

    assert_eq!(
        f.root.outputs()[0].uuid(),
        Some(f.sources3[1].uuid())
    );
    // Only the identity of the signal changed; no crossbar moved.
    assert_eq!(f.d1.count(), c1);
    assert_eq!(f.dn1.count(), cn1);
    assert_eq!(f.d_root.count(), c_root);
}

/// Rewire m2 and n2 with fresh leaves, as a fabric reconfiguration would.
fn replug_mid_level(f: &ThreeLevel) -> Vec<Arc<Source>> {
    let new_sources2 = vec![Source::new("ns2-0"), Source::new("ns2-1")];
    f.m2.replug_input(0, Some(MatrixInput::from(new_sources2[0].clone())));
    f.m2.replug_input(1, Some(MatrixInput::from(new_sources2[1].clone())));
    f.n2.replug_input(2, Some(MatrixInput::from(Source::new("ns3-0"))));
    new_sources2
}

#[test]
fn test_replugged_leaves_change_availability() {
    let f = three_level();
    let new_sources2 = replug_mid_level(&f);
    let available = f.root.available_sources();
    for s in &new_sources2 {
        assert!(available.contains(s));
    }
    assert!(!available.contains(&f.sources2[1]));
}

#[test]
fn test_replugging_a_new_matrix_rewires_availability() {
    let f = three_level();
    let new_sources2 = replug_mid_level(&f);
    let sources_x1 = vec![Source::new("x1-0"), Source::new("x1-1")];
    let x1 = Matrix::new("x1", RecordingDriver::new(), leaf_inputs(&sources_x1), 1);
    f.n1.replug_input(2, Some(MatrixInput::from(x1.outputs()[0].clone())));

    let available = f.root.available_sources();
    for s in &sources_x1 {
        assert!(available.contains(s));
    }
    for s in &new_sources2 {
        assert!(!available.contains(s));
    }
    assert!(!available.contains(&f.sources2[1]));
}

#[test]
fn test_replugged_output_keeps_notifying_after_selection() {
    let f = three_level();
    let new_sources2 = replug_mid_level(&f);
    f.root.select(1, &new_sources2[1]).unwrap();

    let sources_x1 = vec![Source::new("x1-0"), Source::new("x1-1")];
    let x1 = Matrix::new("x1", RecordingDriver::new(), leaf_inputs(&sources_x1), 1);
    x1.select(0, &sources_x1[0]).unwrap();
    f.n1.replug_input(2, Some(MatrixInput::from(x1.outputs()[0].clone())));

    // The root output routed through the replugged slot follows the new
    // upstream signal...
    assert_eq!(f.root.outputs()[1].source().unwrap(), sources_x1[0]);

    // ...and stays bound: a later change on the replugged output still
    // propagates down.
    x1.select(0, &sources_x1[1]).unwrap();
    assert_eq!(f.root.outputs()[1].source().unwrap(), sources_x1[1]);
}
