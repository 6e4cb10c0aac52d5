use crate::pipeline::FailurePolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device index (default: 0).
    pub camera_index: u32,
    /// Requested capture width. A hint; the driver's answer wins.
    pub capture_width: u32,
    /// Requested capture height. A hint; the driver's answer wins.
    pub capture_height: u32,
    /// Path to the model blob.
    pub model_path: PathBuf,
    /// Target frame rate driving the tick period.
    pub target_fps: u32,
    /// Egress queue depth before drop-newest kicks in.
    pub egress_queue: usize,
    /// Consecutive failed ticks before the pipeline stops; 0 skips forever.
    pub max_consecutive_failures: u32,
}

impl Config {
    /// Load configuration from `FOVEA_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            camera_index: env_u32("FOVEA_CAMERA_INDEX", 0),
            capture_width: env_u32("FOVEA_CAPTURE_WIDTH", 640),
            capture_height: env_u32("FOVEA_CAPTURE_HEIGHT", 640),
            model_path: std::env::var("FOVEA_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models/pipeline.onnx")),
            target_fps: env_u32("FOVEA_TARGET_FPS", 30).max(1),
            egress_queue: env_usize("FOVEA_EGRESS_QUEUE", 8),
            max_consecutive_failures: env_u32("FOVEA_MAX_CONVERT_FAILURES", 30),
        }
    }

    /// Fixed tick period derived from the target frame rate (30 Hz → ~33 ms).
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis((1000 / self.target_fps.max(1)) as u64)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        match self.max_consecutive_failures {
            0 => FailurePolicy::Skip,
            n => FailurePolicy::StopAfter(n),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(fps: u32, max_failures: u32) -> Config {
        Config {
            camera_index: 0,
            capture_width: 640,
            capture_height: 640,
            model_path: PathBuf::from("models/pipeline.onnx"),
            target_fps: fps,
            egress_queue: 8,
            max_consecutive_failures: max_failures,
        }
    }

    #[test]
    fn test_tick_period_from_fps() {
        assert_eq!(config(30, 0).tick_period(), Duration::from_millis(33));
        assert_eq!(config(10, 0).tick_period(), Duration::from_millis(100));
    }

    #[test]
    fn test_failure_policy_mapping() {
        assert_eq!(config(30, 0).failure_policy(), FailurePolicy::Skip);
        assert_eq!(config(30, 5).failure_policy(), FailurePolicy::StopAfter(5));
    }
}
