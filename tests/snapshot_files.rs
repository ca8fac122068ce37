//! On-disk snapshot behavior: the ten-digit naming contract, deterministic
//! reruns, the compare flow against written references, and PNM-on-stdout.

use retrace_rs::callset::CallSet;
use retrace_rs::driver::SoftDriver;
use retrace_rs::output::VecSink;
use retrace_rs::replay::{replay, ReplayConfig};
use retrace_rs::trace::{CallOp, VecSource};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn frame_ops() -> Vec<(u32, CallOp)> {
    vec![
        (0, CallOp::Viewport {
            width: 16,
            height: 16,
        }),
        (0, CallOp::Clear {
            color: [200, 100, 50, 255],
        }),
        (0, CallOp::FillRect {
            x: 2,
            y: 2,
            w: 4,
            h: 4,
            color: [10, 20, 30, 255],
        }),
        (0, CallOp::Present),
        (0, CallOp::Clear {
            color: [0, 0, 0, 255],
        }),
        (0, CallOp::Present),
    ]
}

fn snapshot_config(prefix: String) -> ReplayConfig {
    ReplayConfig {
        snapshot_prefix: Some(prefix),
        snapshot_frequency: CallSet::frame(),
        ..ReplayConfig::default()
    }
}

fn run_snapshots(dir: &Path) {
    let report = replay(
        Box::new(VecSource::from_ops(frame_ops())),
        Box::new(SoftDriver::new()),
        Arc::new(VecSink::new()),
        snapshot_config(format!("{}/", dir.display())),
    );
    assert_eq!(report.stats.snapshots_written, 2);
}

#[test]
fn snapshot_names_are_ten_digit_padded() {
    let dir = tempfile::tempdir().unwrap();
    run_snapshots(dir.path());
    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["0000000004.png", "0000000006.png"]);
}

#[test]
fn reruns_are_byte_identical() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    run_snapshots(dir_a.path());
    run_snapshots(dir_b.path());
    for name in ["0000000004.png", "0000000006.png"] {
        let a = fs::read(dir_a.path().join(name)).unwrap();
        let b = fs::read(dir_b.path().join(name)).unwrap();
        assert_eq!(a, b, "{name} differs between identical runs");
    }
}

#[test]
fn compare_against_own_snapshots_reports_full_precision() {
    // First run writes snapshots; second run compares against them.
    let dir = tempfile::tempdir().unwrap();
    run_snapshots(dir.path());

    let sink = Arc::new(VecSink::new());
    let config = ReplayConfig {
        compare_prefix: Some(format!("{}/", dir.path().display())),
        compare_frequency: CallSet::frame(),
        ..ReplayConfig::default()
    };
    let report = replay(
        Box::new(VecSource::from_ops(frame_ops())),
        Box::new(SoftDriver::new()),
        Arc::clone(&sink) as Arc<dyn retrace_rs::output::OutputSink>,
        config,
    );
    assert_eq!(report.stats.compares, 2);
    let text = sink.text();
    assert!(text.contains("Read "));
    assert!(text.contains("Snapshot 4 average precision of 8 bits"));
    assert!(text.contains("Snapshot 6 average precision of 8 bits"));
}

#[test]
fn mismatched_reference_scores_below_full_precision() {
    let dir = tempfile::tempdir().unwrap();
    run_snapshots(dir.path());

    // Re-run with different draw colors against the stored references.
    let mut ops = frame_ops();
    ops[1] = (0, CallOp::Clear {
        color: [0, 0, 0, 255],
    });
    let sink = Arc::new(VecSink::new());
    let config = ReplayConfig {
        compare_prefix: Some(format!("{}/", dir.path().display())),
        compare_frequency: CallSet::frame(),
        verbosity: -1,
        ..ReplayConfig::default()
    };
    replay(
        Box::new(VecSource::from_ops(ops)),
        Box::new(SoftDriver::new()),
        Arc::clone(&sink) as Arc<dyn retrace_rs::output::OutputSink>,
        config,
    );
    let text = sink.text();
    let line = text
        .lines()
        .find(|l| l.starts_with("Snapshot 4 "))
        .expect("compare line for call 4");
    assert!(!line.contains("of 8 bits"), "altered frame compared equal: {line}");
}

#[test]
fn stdout_sentinel_streams_pnm() {
    let sink = Arc::new(VecSink::new());
    let config = ReplayConfig {
        verbosity: -2,
        ..snapshot_config("-".to_string())
    };
    let report = replay(
        Box::new(VecSource::from_ops(frame_ops())),
        Box::new(SoftDriver::new()),
        Arc::clone(&sink) as Arc<dyn retrace_rs::output::OutputSink>,
        config,
    );
    // PNM goes to the sink; no files, no Wrote lines.
    assert_eq!(report.stats.snapshots_written, 0);
    let bytes = sink.take();
    assert!(bytes.starts_with(b"P6\n#4\n16 16\n255\n"));
    let second = b"P6\n#6\n";
    assert!(
        bytes
            .windows(second.len())
            .any(|w| w == second),
        "second PNM frame missing"
    );
}
