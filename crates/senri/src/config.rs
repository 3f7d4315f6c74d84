use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::SenriResult;

/// Runtime tunables, loadable from TOML. Durations are written in milliseconds.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SenriConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub abr: AbrConfig,
}

impl SenriConfig {
    pub fn from_toml(data: &str) -> SenriResult<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn load(path: impl AsRef<Path>) -> SenriResult<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_toml(&data)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Segments behind the live edge to start from. Negative values count
    /// from one past the last segment.
    pub live_start_index: i64,

    /// Reload interval when a playlist declares no target duration
    #[serde(with = "millis")]
    pub default_target_duration: Duration,

    #[serde(with = "millis")]
    pub default_part_target_duration: Duration,

    /// How long a blocking playlist request may be held open by the server
    #[serde(with = "millis")]
    pub blocking_reload_timeout: Duration,

    /// Continuous reload failure longer than this is reported as a stall
    #[serde(with = "millis")]
    pub reload_failure_timeout: Duration,

    #[serde(with = "millis")]
    pub min_reload_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            live_start_index: -3,
            default_target_duration: Duration::from_secs(10),
            default_part_target_duration: Duration::from_secs(1),
            blocking_reload_timeout: Duration::from_secs(30),
            reload_failure_timeout: Duration::from_secs(15),
            min_reload_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AbrConfig {
    /// Below this buffer a falling trend switches down
    #[serde(with = "millis")]
    pub lower_switch_buffer: Duration,

    /// Above this buffer a rising trend switches up
    #[serde(with = "millis")]
    pub upper_switch_buffer: Duration,

    /// Buffer level that switches down regardless of the trend
    #[serde(with = "millis")]
    pub starvation_buffer: Duration,

    /// The buffer counts as full within this margin of its maximum
    #[serde(with = "millis")]
    pub full_buffer_margin: Duration,

    pub trend_window: usize,
    pub speed_window: usize,
    pub history_window: usize,

    #[serde(with = "millis")]
    pub up_cooldown_after_down: Duration,

    #[serde(with = "millis")]
    pub up_cooldown_after_up: Duration,
}

impl Default for AbrConfig {
    fn default() -> Self {
        Self {
            lower_switch_buffer: Duration::from_secs(15),
            upper_switch_buffer: Duration::from_secs(30),
            starvation_buffer: Duration::from_millis(100),
            full_buffer_margin: Duration::from_secs(1),
            trend_window: 10,
            speed_window: 30,
            history_window: 3,
            up_cooldown_after_down: Duration::from_secs(60),
            up_cooldown_after_up: Duration::from_secs(9),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
