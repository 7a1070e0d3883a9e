// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Two-level KVM-style fabric demo.
//!
//! Four machines feed two 4x2 leaf crossbars (video and USB). A root
//! switch cascades off the video crossbar so a console sees every machine
//! through one cable. Selecting a machine's video at the root claims a
//! path through the leaf; the machine's USB lane follows as a companion.
//!
//! Run with `RUST_LOG=debug` to watch the routing decisions.

use std::sync::Arc;

use switchlib::{Driver, Matrix, MatrixGroup, MatrixInput, Source, SourceGroup};

/// Stands in for real crossbar hardware; logs what it is told to switch.
struct ConsoleDriver {
    name: &'static str,
}

impl Driver for ConsoleDriver {
    fn program(&self, output_idx: usize, input_idx: usize) -> anyhow::Result<()> {
        tracing::info!(
            "[{}] crossbar programmed: output {} <- input {}",
            self.name,
            output_idx,
            input_idx
        );
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let machines: Vec<Arc<Source>> = (1..=4)
        .map(|i| Source::new(format!("machine{i}-video")))
        .collect();
    let usb_lanes: Vec<Arc<Source>> = (1..=4)
        .map(|i| Source::new(format!("machine{i}-usb")))
        .collect();

    let video = Matrix::new(
        "video",
        Arc::new(ConsoleDriver { name: "video" }),
        machines
            .iter()
            .map(|s| Some(MatrixInput::from(s.clone())))
            .collect(),
        2,
    );
    let usb = Matrix::new(
        "usb",
        Arc::new(ConsoleDriver { name: "usb" }),
        usb_lanes
            .iter()
            .map(|s| Some(MatrixInput::from(s.clone())))
            .collect(),
        1,
    );

    // The root console switch sees the world through video's two outputs.
    let root = Matrix::new(
        "console",
        Arc::new(ConsoleDriver { name: "console" }),
        video
            .outputs()
            .iter()
            .map(|o| Some(MatrixInput::from(o.clone())))
            .collect(),
        1,
    );

    let signals = SourceGroup::new()
        .with_group("video", machines.iter().cloned().map(Some).collect())
        .with_group("usb", usb_lanes.iter().cloned().map(Some).collect());
    signals.assign_outputs([("usb", usb.outputs()[0].clone())]);

    let fabric = MatrixGroup::new(signals)
        .with_matrix("video", video.clone())
        .with_matrix("usb", usb);

    tracing::info!(
        "console can reach {} sources through the cascade",
        root.available_sources().len()
    );

    // Put machine 2 on the console: routes the video leaf, then the root,
    // and drags the machine's USB lane to the shared hub port.
    root.select(0, &machines[1])?;
    fabric.select("usb", 0, &usb_lanes[1], true)?;

    tracing::info!(
        "console output now carries {}",
        root.outputs()[0]
            .source()
            .map(|s| s.name().to_owned())
            .unwrap_or_else(|| "nothing".to_owned())
    );

    // Switch to machine 4 through the matrix group; companions follow
    // automatically this time.
    fabric.select("video", 1, &machines[3], false)?;
    tracing::info!(
        "video output 1 carries {}, usb hub carries {}",
        fabric
            .get_output("video", 1)
            .and_then(|o| o.source())
            .map(|s| s.name().to_owned())
            .unwrap_or_default(),
        fabric
            .get_output("usb", 0)
            .and_then(|o| o.source())
            .map(|s| s.name().to_owned())
            .unwrap_or_default()
    );

    Ok(())
}
