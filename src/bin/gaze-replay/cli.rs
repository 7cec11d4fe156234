use clap::{command, Parser};

// Some defaults; some of which can be overriden via CLI args
const CONFIG_FILE_PATH: &str = "./gaze.json";
const CALIBRATION_FILE_PATH: &str = "./calibration.json";
const REPLAY_FILE_PATH: &str = "./frames.jsonl";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Where to load gaze pipeline config
    #[arg(long="gazeConfigPath",default_value_t=String::from(CONFIG_FILE_PATH))]
    pub config_path: String,

    /// Where to load (and, after calibrating, save) the calibration record
    #[arg(long="calibrationPath",default_value_t=String::from(CALIBRATION_FILE_PATH))]
    pub calibration_path: String,

    /// Recorded landmark frames, one JSON object per line
    #[arg(long="replayPath",default_value_t=String::from(REPLAY_FILE_PATH))]
    pub replay_path: String,

    /// Run a calibration session (5 or 9 points) over the start of the recording
    #[arg(long = "calibrate")]
    pub calibrate: Option<usize>,

    /// Sleep between frames to match the recorded timestamps
    #[arg(long = "realtime")]
    pub realtime: bool,

    /// Halt cursor output once the replay reaches this timestamp (ms)
    #[arg(long = "haltAt")]
    pub halt_at: Option<u64>,

    #[arg(long = "loglevel",default_value_t=String::from("info"))]
    pub log_level: String,
}
