//! End-to-end engine behaviour: adjustment sessions, history, worker-count
//! parity and operation log serialization.

use std::sync::Arc;
use std::time::Duration;

use rasterlab::io;
use rasterlab::ops::convolution::{Kernel, gaussian_kernel};
use rasterlab::ops::frequency::{FilterKind, FrequencyFilter, FrequencyRange};
use rasterlab::ops::steganography::{self, Payload, StegoParams};
use rasterlab::{
    AdjustParam, BlendMode, Engine, EngineError, EngineSettings, ExecContext, Operation, PixelBuffer, Scheduler,
};

fn gradient(w: u32, h: u32) -> PixelBuffer {
    PixelBuffer::from_fn(w, h, |x, y| {
        let fx = x as f32 / w as f32;
        let fy = y as f32 / h as f32;
        [fx, fy, (fx * fy * 3.0).fract(), 0.5 + 0.5 * fx]
    })
    .unwrap()
}

fn checker(w: u32, h: u32) -> PixelBuffer {
    PixelBuffer::from_fn(w, h, |x, y| if (x / 3 + y / 3) % 2 == 0 { [0.9, 0.8, 0.1, 1.0] } else { [0.1, 0.2, 0.7, 1.0] })
        .unwrap()
}

fn engine() -> Engine {
    Engine::new(gradient(17, 13), EngineSettings::default())
        .with_scheduler(Scheduler::new(3, Duration::from_secs(60)))
}

fn every_operation() -> Vec<Operation> {
    let layer = Arc::new(checker(17, 13));
    vec![
        Operation::Grayscale,
        Operation::InverseColour,
        Operation::FlipHorizontal,
        Operation::FlipVertical,
        Operation::Convolution { kernel: gaussian_kernel(2) },
        Operation::Convolution {
            kernel: Kernel::new(vec![vec![0.0, 1.0, 0.0], vec![1.0, -4.0, 1.0], vec![0.0, 1.0, 0.0]]).unwrap(),
        },
        Operation::EdgeDetection { blur_radius: 2 },
        Operation::Sharpen,
        Operation::Blend { mode: BlendMode::Multiply, image: Arc::clone(&layer) },
        Operation::Blend { mode: BlendMode::SoftLight, image: layer },
        Operation::HistogramEqualization,
        Operation::FrequencyFilter {
            filter: FrequencyFilter::new(FilterKind::Butterworth { order: 2 }, FrequencyRange::BandReject, 0.3, 0.1),
        },
        Operation::SteganographyEncode {
            payload: Payload::Text("hidden".into()),
            params: StegoParams { key: Some("k".into()), bits: 2, ..StegoParams::default() },
        },
        Operation::Adjust { param: AdjustParam::Brightness, value: 0.3 },
        Operation::Adjust { param: AdjustParam::Hue, value: 90.0 },
        Operation::Adjust { param: AdjustParam::GaussianBlur, value: 3.0 },
        Operation::Adjust { param: AdjustParam::BoxBlur, value: 1.0 },
        Operation::Adjust { param: AdjustParam::Rotate, value: 30.0 },
    ]
}

// ============================================================================
// Adjustment sessions
// ============================================================================

#[test]
fn test_brightness_reset_restores_exact_base() {
    let mut e = engine();
    let base = e.image().clone();
    e.adjust("brightness", 0.3).unwrap();
    assert_ne!(e.image(), &base);
    e.reset_adjustment().unwrap();
    assert_eq!(e.image(), &base);
    assert!(!e.can_undo());
}

#[test]
fn test_submit_then_undo_restores_pre_adjustment_image() {
    let mut e = engine();
    let base = e.image().clone();
    e.adjust("brightness", 0.3).unwrap();
    e.adjust("brightness", 0.1).unwrap();
    let preview = e.image().clone();
    e.submit_adjustment().unwrap();
    assert_eq!(e.image(), &preview);
    e.undo().unwrap();
    assert_eq!(e.image(), &base);
    e.redo().unwrap();
    assert_eq!(e.image(), &preview);
}

#[test]
fn test_undo_on_fresh_engine_fails_cleanly() {
    let mut e = engine();
    let base = e.image().clone();
    assert!(matches!(e.undo(), Err(EngineError::NothingToUndo)));
    assert!(matches!(e.redo(), Err(EngineError::NothingToRedo)));
    assert_eq!(e.image(), &base);
}

#[test]
fn test_rejected_operation_leaves_history_untouched() {
    let mut e = engine();
    let small = Arc::new(PixelBuffer::new(2, 2).unwrap());
    let err = e.transform(Operation::Blend { mode: BlendMode::Screen, image: small }).unwrap_err();
    assert!(matches!(err, EngineError::DimensionMismatch { .. }));
    let err = e.transform(Operation::Blend { mode: BlendMode::Hue, image: Arc::new(checker(17, 13)) }).unwrap_err();
    assert!(matches!(err, EngineError::BlendModeNotImplemented(BlendMode::Hue)));
    assert!(!e.can_undo());
    assert!(e.operation_log().is_empty());
}

#[test]
fn test_hidden_text_survives_engine_commit() {
    let mut e = engine();
    e.encode_text("meet at dawn", Some("secret"), false).unwrap();
    let params = e.stego_params(Some("secret"));
    assert_eq!(steganography::decode_text(e.image(), &params).unwrap(), "meet at dawn");
}

// ============================================================================
// Worker-count parity
// ============================================================================

#[test]
fn test_every_operation_is_identical_across_worker_counts() {
    let src = gradient(17, 13);
    for op in every_operation() {
        let serial = op.apply(&src, &ExecContext::new(Scheduler::new(1, Duration::from_secs(60)))).unwrap();
        for workers in [2, 8] {
            let ctx = ExecContext::new(Scheduler::new(workers, Duration::from_secs(60)));
            let parallel = op.apply(&src, &ctx).unwrap();
            assert_eq!(parallel, serial, "{op} differs with {workers} workers");
        }
    }
}

#[test]
fn test_more_workers_than_rows() {
    let src = gradient(5, 3);
    let ctx = ExecContext::new(Scheduler::new(8, Duration::from_secs(60)));
    let serial = ExecContext::new(Scheduler::serial());
    let op = Operation::Convolution { kernel: gaussian_kernel(3) };
    assert_eq!(op.apply(&src, &ctx).unwrap(), op.apply(&src, &serial).unwrap());
}

// ============================================================================
// Serialization
// ============================================================================

#[test]
fn test_every_operation_round_trips_through_json() {
    let ops = every_operation();
    let json = io::operations_to_json(&ops).unwrap();
    assert_eq!(io::operations_from_json(&json).unwrap(), ops);
}

#[test]
fn test_operation_log_replays_to_same_image() {
    let mut e = engine();
    e.transform(Operation::Sharpen).unwrap();
    e.adjust("contrast", 0.4).unwrap();
    e.submit_adjustment().unwrap();
    e.transform(Operation::FlipVertical).unwrap();

    let json = io::operations_to_json(&e.operation_log()).unwrap();
    let ctx = ExecContext::new(Scheduler::serial());
    let mut replay = gradient(17, 13);
    for op in io::operations_from_json(&json).unwrap() {
        replay = op.apply(&replay, &ctx).unwrap();
    }
    assert_eq!(&replay, e.image());
}

#[test]
fn test_project_file_keeps_image_and_log() {
    let mut e = engine();
    e.transform(Operation::Grayscale).unwrap();
    e.transform(Operation::HistogramEqualization).unwrap();
    let path = std::env::temp_dir().join(format!("rasterlab_workflow_{}.rlab", std::process::id()));
    io::save_project(e.image(), &e.operation_log(), &path).unwrap();
    let project = io::load_project(&path).unwrap();
    assert_eq!(&project.image, e.image());
    assert_eq!(project.operations, vec![Operation::Grayscale, Operation::HistogramEqualization]);
    let _ = std::fs::remove_file(&path);
}
