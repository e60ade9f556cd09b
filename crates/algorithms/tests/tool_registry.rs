//! Running the hydrology chain through the tool registry, file to file.

use drainflow_algorithms::tools::{run_tool, TOOLS};
use drainflow_core::io::{read_geotiff, write_geotiff};
use drainflow_core::{Error, GeoTransform, Progress, Raster, SilentProgress};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

/// 3x3 ramp falling to the east
fn write_ramp(dir: &TempDir) -> PathBuf {
    let mut dem = Raster::from_vec(
        vec![
            3.0, 2.0, 1.0,
            3.0, 2.0, 1.0,
            3.0, 2.0, 1.0,
        ],
        3,
        3,
    )
    .unwrap();
    dem.set_transform(GeoTransform::new(500.0, 900.0, 10.0, -10.0));
    dem.set_nodata(Some(-32768.0));
    let path = dir.path().join("ramp.tif");
    write_geotiff(&dem, &path).unwrap();
    path
}

#[test]
fn every_tool_has_a_synopsis_starting_with_its_input() {
    assert!(TOOLS.len() >= 10);
    for tool in TOOLS {
        assert!(tool.synopsis.starts_with('<'), "{} synopsis", tool.name);
        assert!(tool.synopsis.contains("<output>"), "{} synopsis", tool.name);
    }
}

#[test]
fn ramp_pointer_then_accumulation() {
    let dir = TempDir::new().unwrap();
    let dem = write_ramp(&dir);
    let pntr = dir.path().join("pntr.tif");
    let acc = dir.path().join("acc.tif");

    run_tool("D8Pointer", &[path_arg(&dem), path_arg(&pntr)], &SilentProgress).unwrap();
    run_tool(
        "FlowAccumD8",
        &[path_arg(&pntr), path_arg(&acc), "cells".into(), "false".into()],
        &SilentProgress,
    )
    .unwrap();

    let acc: Raster<f64> = read_geotiff(&acc).unwrap();
    for row in 0..3 {
        assert_eq!(acc.get(row, 0).unwrap(), 1.0);
        assert_eq!(acc.get(row, 2).unwrap(), 3.0);
    }
    assert_eq!(acc.transform().origin_x, 500.0);
}

#[test]
fn total_catchment_area_uses_cell_area() {
    let dir = TempDir::new().unwrap();
    let dem = write_ramp(&dir);
    let pntr = dir.path().join("pntr.tif");
    let acc = dir.path().join("tca.tif");

    run_tool("D8Pointer", &[path_arg(&dem), path_arg(&pntr)], &SilentProgress).unwrap();
    run_tool(
        "FlowAccumD8",
        &[path_arg(&pntr), path_arg(&acc), "total catchment area".into()],
        &SilentProgress,
    )
    .unwrap();

    let acc: Raster<f64> = read_geotiff(&acc).unwrap();
    assert_eq!(acc.get(1, 2).unwrap(), 300.0);
}

#[test]
fn dinf_chain_on_ramp() {
    let dir = TempDir::new().unwrap();
    let dem = write_ramp(&dir);
    let pntr = dir.path().join("dinf.tif");
    let acc = dir.path().join("dinf_acc.tif");

    run_tool("DInfPointer", &[path_arg(&dem), path_arg(&pntr)], &SilentProgress).unwrap();
    run_tool("FlowAccumDinf", &[path_arg(&pntr), path_arg(&acc)], &SilentProgress).unwrap();

    let pntr: Raster<f64> = read_geotiff(&pntr).unwrap();
    assert_eq!(pntr.get(1, 0).unwrap(), 90.0);
    let acc: Raster<f64> = read_geotiff(&acc).unwrap();
    assert_eq!(acc.get(1, 1).unwrap(), 2.0);
}

#[test]
fn malformed_pointer_is_reported() {
    let dir = TempDir::new().unwrap();
    let dem = write_ramp(&dir);
    let acc = dir.path().join("acc.tif");

    // Elevations 1..3 are not all D8 codes
    let err = run_tool("FlowAccumD8", &[path_arg(&dem), path_arg(&acc)], &SilentProgress).unwrap_err();
    assert!(matches!(err, Error::InvalidPointer { .. }));
    assert!(!acc.exists(), "Nothing is written when the run fails");
}

#[derive(Default)]
struct Recorder {
    cancel: AtomicBool,
    messages: Mutex<Vec<String>>,
}

impl Progress for Recorder {
    fn update(&self, _label: &str, _percent: i32) {}

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn feedback(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

#[test]
fn cancelled_tool_notifies_once_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let dem = write_ramp(&dir);
    let out = dir.path().join("filled.tif");
    let progress = Recorder::default();
    progress.cancel.store(true, Ordering::SeqCst);

    let err = run_tool("FillDepressionsPandD", &[path_arg(&dem), path_arg(&out)], &progress).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(progress.messages.lock().unwrap().len(), 1);
    assert!(!out.exists());
}

#[test]
fn configuration_errors_are_fed_back() {
    let progress = Recorder::default();
    let err = run_tool("FillDepressions", &[], &progress).unwrap_err();
    assert!(err.is_configuration());
    let messages = progress.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("dem"));
}
