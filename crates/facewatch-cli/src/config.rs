use std::path::PathBuf;

use facewatch_core::{LivenessConfig, SessionConfig};

/// Runtime configuration, loaded from environment variables.
///
/// Every tunable of the pipeline is exposed here rather than hardcoded.
/// Out-of-range values (negative timeout, zero interval) are passed through
/// as-is; the core layers define degenerate-but-safe behavior for them.
pub struct Config {
    /// Requested camera capture width in pixels.
    pub camera_width: u32,
    /// Requested camera capture height in pixels.
    pub camera_height: u32,
    /// Factor frames are downscaled by before detection (0.25 = quarter).
    pub downscale: f32,
    /// Recompute identity labels every Nth frame.
    pub recognition_interval: u32,
    /// Eye openness below this counts as closed.
    pub eye_closed_threshold: f32,
    /// Consecutive closed frames required for a blink.
    pub consecutive_closed_frames: u32,
    /// Nose displacement (reduced-frame px) that counts as motion.
    pub movement_threshold: f32,
    /// Seconds the "live" signal lasts after a refresh.
    pub liveness_timeout_secs: f32,
    /// Maximum embedding distance for a positive identity match.
    pub match_tolerance: f32,
    /// Path to the SQLite gallery database.
    pub db_path: PathBuf,
}

impl Config {
    /// Load configuration from `FACEWATCH_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facewatch");

        let db_path = std::env::var("FACEWATCH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("gallery.db"));

        Self {
            camera_width: env_u32("FACEWATCH_CAMERA_WIDTH", 640),
            camera_height: env_u32("FACEWATCH_CAMERA_HEIGHT", 480),
            downscale: env_f32("FACEWATCH_DOWNSCALE", 0.25),
            recognition_interval: env_u32("FACEWATCH_RECOGNITION_INTERVAL", 5),
            eye_closed_threshold: env_f32("FACEWATCH_EYE_CLOSED_THRESHOLD", 0.24),
            consecutive_closed_frames: env_u32("FACEWATCH_CONSECUTIVE_CLOSED_FRAMES", 2),
            movement_threshold: env_f32("FACEWATCH_MOVEMENT_THRESHOLD", 2.5),
            liveness_timeout_secs: env_f32("FACEWATCH_LIVENESS_TIMEOUT_SECS", 2.0),
            match_tolerance: env_f32("FACEWATCH_MATCH_TOLERANCE", 0.5),
            db_path,
        }
    }

    /// Bundle the pipeline tunables for the core session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            recognition_interval: self.recognition_interval,
            match_tolerance: self.match_tolerance,
            liveness: LivenessConfig {
                eye_closed_threshold: self.eye_closed_threshold,
                consecutive_closed_frames: self.consecutive_closed_frames,
                movement_threshold: self.movement_threshold,
                liveness_timeout_secs: self.liveness_timeout_secs,
            },
        }
    }

    /// Factor that maps reduced-frame coordinates back to display pixels.
    pub fn display_scale(&self) -> f32 {
        if self.downscale > 0.0 {
            1.0 / self.downscale
        } else {
            1.0
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
