// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process-wide source registry
//!
//! Optional convenience: every constructed [`Source`] is recorded here so
//! callers can enumerate live signals or look one up by UUID. The routing
//! core never consults it. `reset_sources` exists for test isolation;
//! tests touching the registry run serially for the same reason.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use uuid::Uuid;

use super::signals::Source;

static GLOBAL_SOURCES: OnceLock<Mutex<HashMap<Uuid, Arc<Source>>>> = OnceLock::new();

fn global_sources() -> &'static Mutex<HashMap<Uuid, Arc<Source>>> {
    GLOBAL_SOURCES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Record a source. Called by [`Source::new`].
pub(crate) fn register_source(source: &Arc<Source>) {
    global_sources().lock().insert(source.uuid(), source.clone());
}

/// Every source created since the last [`reset_sources`].
pub fn list_sources() -> Vec<Arc<Source>> {
    global_sources().lock().values().cloned().collect()
}

/// Look a source up by its UUID.
pub fn get_source(uuid: Uuid) -> Option<Arc<Source>> {
    global_sources().lock().get(&uuid).cloned()
}

/// Forget every registered source.
pub fn reset_sources() {
    global_sources().lock().clear();
}
