use std::collections::VecDeque;

use gaze_cursor::gaze_config::GazeConfig;
use gaze_cursor::pipeline::{CursorControl, FrameOutcome, LandmarkSource, Mode, Pipeline};
use gaze_cursor::record::CalibrationRecord;
use gaze_cursor::systems::mapping::ModelKind;
use gaze_cursor::tracking::{CursorCommand, EyeLandmarks, LandmarkFrame, ScreenPoint};

#[derive(Default)]
struct RecordingCursor {
    commands: Vec<CursorCommand>,
}

impl CursorControl for RecordingCursor {
    fn move_to(&mut self, x: i32, y: i32) {
        self.commands.push(CursorCommand::MoveTo { x, y });
    }

    fn click(&mut self) {
        self.commands.push(CursorCommand::Click);
    }
}

struct ScriptedSource(VecDeque<LandmarkFrame>);

impl LandmarkSource for ScriptedSource {
    fn next_frame(&mut self) -> Option<LandmarkFrame> {
        self.0.pop_front()
    }
}

/// A synthetic eye whose iris sits at a position that is an affine function
/// of where on screen it is looking.
fn looking_at(target: ScreenPoint, timestamp: u64) -> LandmarkFrame {
    let nx = 0.2 + 0.6 * target.x as f32 / 1920.;
    let ny = 0.3 + 0.4 * target.y as f32 / 1080.;
    LandmarkFrame {
        timestamp,
        image_width: 640,
        image_height: 480,
        eye: Some(EyeLandmarks {
            iris: vec![
                (300. + 60. * nx - 3., 200. + 30. * ny),
                (300. + 60. * nx + 3., 200. + 30. * ny),
            ],
            outer_corner: (300., 215.),
            inner_corner: (360., 215.),
            upper_lid: (330., 200.),
            lower_lid: (330., 230.),
            bounds: None,
        }),
    }
}

fn config() -> GazeConfig {
    GazeConfig {
        calibration_layout: gaze_cursor::systems::calibration::CalibrationLayout::NinePoint,
        samples_per_target: 4,
        smoothing_alpha: 0.5,
        dwell_click_enabled: true,
        dwell_threshold_ms: 500,
        dwell_radius_px: 30,
        ..Default::default()
    }
}

/// Same eye with the lids pressed together
fn eyes_shut(timestamp: u64) -> LandmarkFrame {
    let mut frame = looking_at(ScreenPoint::new(960, 540), timestamp);
    if let Some(eye) = frame.eye.as_mut() {
        eye.upper_lid = (330., 215.);
        eye.lower_lid = (330., 215.);
    }
    frame
}

fn calibrated_pipeline() -> (Pipeline, RecordingCursor, u64) {
    calibrated_pipeline_with(config())
}

fn calibrated_pipeline_with(config: GazeConfig) -> (Pipeline, RecordingCursor, u64) {
    let mut pipeline = Pipeline::new(config).unwrap();
    let mut cursor = RecordingCursor::default();
    pipeline.begin_calibration();
    let mut t = 0;
    while let Some(target) = pipeline.status().session.and_then(|s| s.current_target) {
        pipeline.process_frame(&looking_at(target, t), &mut cursor);
        t += 33;
    }
    assert_eq!(pipeline.mode(), Mode::Tracking);
    assert!(cursor.commands.is_empty());
    (pipeline, cursor, t)
}

fn clicks(cursor: &RecordingCursor) -> usize {
    cursor
        .commands
        .iter()
        .filter(|c| **c == CursorCommand::Click)
        .count()
}

#[test]
fn tracking_moves_cursor_and_dwell_clicks_once() {
    let (mut pipeline, mut cursor, start) = calibrated_pipeline();
    let target = ScreenPoint::new(1200, 300);
    let frames: VecDeque<_> = (0..40)
        .map(|i| looking_at(target, start + i * 33))
        .collect();
    let processed = pipeline.run(&mut ScriptedSource(frames), &mut cursor);
    assert_eq!(processed, 40);

    let Some(CursorCommand::MoveTo { x, y }) = cursor
        .commands
        .iter()
        .rev()
        .find(|c| matches!(c, CursorCommand::MoveTo { .. }))
        .copied()
    else {
        panic!("no cursor moves emitted");
    };
    assert!((x - 1200).abs() <= 3 && (y - 300).abs() <= 3, "ended at {x},{y}");
    assert_eq!(clicks(&cursor), 1);
}

#[test]
fn panic_switch_silences_all_output() {
    let (mut pipeline, mut cursor, start) = calibrated_pipeline();
    let switch = pipeline.panic_switch();
    switch.trigger();
    assert!(pipeline.status().halted);

    for i in 0..60 {
        let target = if i < 20 {
            ScreenPoint::new(400, 800)
        } else {
            ScreenPoint::new(1500, 200)
        };
        pipeline.process_frame(&looking_at(target, start + i * 33), &mut cursor);
    }
    assert!(cursor.commands.is_empty());

    // Resuming picks up from the already-filtered state
    switch.resume();
    let outcome = pipeline.process_frame(
        &looking_at(ScreenPoint::new(1500, 200), start + 61 * 33),
        &mut cursor,
    );
    assert!(matches!(outcome, FrameOutcome::Tracked { moved: true, .. }));
    assert_eq!(cursor.commands.len(), 1);
}

#[test]
fn calibration_session_suppresses_tracking_output() {
    let (mut pipeline, mut cursor, start) = calibrated_pipeline();
    pipeline.begin_calibration();
    for i in 0..10 {
        let outcome =
            pipeline.process_frame(&looking_at(ScreenPoint::new(900, 500), start + i * 33), &mut cursor);
        assert!(matches!(outcome, FrameOutcome::Sampled(_)), "{:?}", outcome);
    }
    assert!(cursor.commands.is_empty());
    assert_eq!(pipeline.mode(), Mode::Calibrating);
}

#[test]
fn cancelled_session_keeps_previous_model() {
    let (mut pipeline, mut cursor, start) = calibrated_pipeline();
    let before = pipeline.model().unwrap();
    pipeline.process_frame(&looking_at(ScreenPoint::new(600, 600), start), &mut cursor);
    let cursor_before = pipeline.status().cursor;

    pipeline.begin_calibration();
    pipeline.process_frame(&looking_at(ScreenPoint::new(10, 10), start + 33), &mut cursor);
    pipeline.cancel_calibration();

    assert_eq!(pipeline.mode(), Mode::Tracking);
    assert!(std::sync::Arc::ptr_eq(&before, &pipeline.model().unwrap()));
    assert_eq!(pipeline.status().cursor, cursor_before);

    let commands_before = cursor.commands.len();
    pipeline.process_frame(&looking_at(ScreenPoint::new(1300, 900), start + 66), &mut cursor);
    assert!(cursor.commands.len() > commands_before);
}

#[test]
fn persisted_calibration_restores_tracking() {
    let (pipeline, _, _) = calibrated_pipeline();
    let text = pipeline.current_record().unwrap().to_json().unwrap();

    let mut fresh = Pipeline::new(config()).unwrap();
    let mut cursor = RecordingCursor::default();
    fresh
        .load_record(&CalibrationRecord::from_json(&text).unwrap())
        .unwrap();
    assert_eq!(fresh.model().unwrap().kind(), ModelKind::Polynomial);

    let outcome = fresh.process_frame(&looking_at(ScreenPoint::new(960, 540), 0), &mut cursor);
    match outcome {
        FrameOutcome::Tracked { cursor: c, .. } => {
            assert!((c.x - 960).abs() <= 3 && (c.y - 540).abs() <= 3, "{:?}", c)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn uncalibrated_pipeline_is_inert() {
    let mut pipeline = Pipeline::new(config()).unwrap();
    let mut cursor = RecordingCursor::default();
    let frames: VecDeque<_> = (0..30)
        .map(|i| looking_at(ScreenPoint::new(960, 540), i * 33))
        .collect();
    pipeline.run(&mut ScriptedSource(frames), &mut cursor);
    assert!(cursor.commands.is_empty());
}

#[test]
fn long_blink_clicks_once_without_explicit_bounds() {
    let (mut pipeline, mut cursor, start) = calibrated_pipeline_with(GazeConfig {
        dwell_click_enabled: false,
        blink_click_enabled: true,
        ..config()
    });
    let mut t = start;
    for _ in 0..5 {
        pipeline.process_frame(&looking_at(ScreenPoint::new(960, 540), t), &mut cursor);
        t += 33;
    }
    let before_shut = cursor.commands.len();

    for _ in 0..12 {
        let outcome = pipeline.process_frame(&eyes_shut(t), &mut cursor);
        assert!(matches!(outcome, FrameOutcome::EyeClosed { .. }), "{:?}", outcome);
        t += 33;
    }
    // Shut frames never move the cursor; the only output is the click
    assert_eq!(&cursor.commands[before_shut..], &[CursorCommand::Click]);

    for _ in 0..5 {
        pipeline.process_frame(&looking_at(ScreenPoint::new(960, 540), t), &mut cursor);
        t += 33;
    }

    assert_eq!(clicks(&cursor), 1);
}
