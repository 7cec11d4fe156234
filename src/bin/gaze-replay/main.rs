use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};

use gaze_cursor::gaze_config::load_config_from_file;
use gaze_cursor::pipeline::{CursorControl, FrameOutcome, LandmarkSource, Pipeline};
use gaze_cursor::record::{load_record_from_file, save_record_to_file};
use gaze_cursor::systems::calibration::CalibrationLayout;
use gaze_cursor::tracking::LandmarkFrame;

mod cli;
use cli::Cli;

/// Reads one `LandmarkFrame` per line; unreadable lines are skipped
struct JsonLinesSource {
    lines: Lines<BufReader<File>>,
    line_number: usize,
}

impl JsonLinesSource {
    fn open(path: &str) -> Result<Self> {
        let file =
            File::open(path).map_err(|e| anyhow!("Failed to open replay {}: {}", path, e))?;
        Ok(JsonLinesSource {
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }
}

impl LandmarkSource for JsonLinesSource {
    fn next_frame(&mut self) -> Option<LandmarkFrame> {
        for line in self.lines.by_ref() {
            self.line_number += 1;
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    error!("Failed to read replay: {}", e);
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LandmarkFrame>(&line) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!("Skipping line {}: {}", self.line_number, e),
            }
        }
        None
    }
}

/// Stands in for OS cursor injection
#[derive(Default)]
struct LoggingCursor {
    moves: usize,
    clicks: usize,
}

impl CursorControl for LoggingCursor {
    fn move_to(&mut self, x: i32, y: i32) {
        self.moves += 1;
        debug!("moveTo({}, {})", x, y);
    }

    fn click(&mut self) {
        self.clicks += 1;
        info!("click()");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger from the environment
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    debug!("Started; args: {:?}", cli);

    let mut config = load_config_from_file(&cli.config_path)?;
    if let Some(points) = cli.calibrate {
        config.calibration_layout = CalibrationLayout::from_count(points)
            .ok_or_else(|| anyhow!("--calibrate takes 5 or 9, got {}", points))?;
    }

    let mut pipeline = Pipeline::new(config)?;
    let panic_switch = pipeline.panic_switch();

    if cli.calibrate.is_some() {
        let snapshot = pipeline.begin_calibration();
        info!(
            "Calibrating over {} targets; first target {:?}",
            snapshot.target_count, snapshot.current_target
        );
    } else {
        match load_record_from_file(&cli.calibration_path) {
            Ok(record) => {
                if let Err(e) = pipeline.load_record(&record) {
                    warn!("Calibration unusable, tracking stays inert: {}", e);
                }
            }
            Err(e) => warn!("No calibration loaded, tracking stays inert: {}", e),
        }
    }

    let mut source = JsonLinesSource::open(&cli.replay_path)?;
    let mut cursor = LoggingCursor::default();
    let mut frames = 0;
    let mut no_face = 0;
    let mut last_timestamp = None;

    while let Some(frame) = source.next_frame() {
        frames += 1;

        if cli.realtime {
            if let Some(last) = last_timestamp {
                let gap = frame.timestamp.saturating_sub(last);
                thread::sleep(Duration::from_millis(gap));
            }
            last_timestamp = Some(frame.timestamp);
        }

        if let Some(halt_at) = cli.halt_at {
            if frame.timestamp >= halt_at && !panic_switch.is_halted() {
                warn!("Halting cursor output at {}ms", frame.timestamp);
                panic_switch.trigger();
            }
        }

        match pipeline.process_frame(&frame, &mut cursor) {
            FrameOutcome::NoFace(_) => no_face += 1,
            FrameOutcome::Calibrated(report) => {
                info!(
                    "Calibrated at frame {}: mean error {:.1}px",
                    frames, report.mean_px
                );
                if let Some(record) = pipeline.current_record() {
                    if let Err(e) = save_record_to_file(&record, &cli.calibration_path) {
                        error!("Failed to save calibration: {}", e);
                    }
                }
            }
            FrameOutcome::CalibrationFailed(e) => error!("Calibration failed: {}", e),
            _ => {}
        }
    }

    info!(
        "Replayed {} frames ({} without a face): {} moves, {} clicks; final status {:?}",
        frames,
        no_face,
        cursor.moves,
        cursor.clicks,
        pipeline.status()
    );
    Ok(())
}
