pub mod error;
pub mod gaze_config;
pub mod geometry_utils;
pub mod pipeline;
pub mod record;
pub mod systems;
pub mod tracking;

pub type Point2D = (f32, f32);
