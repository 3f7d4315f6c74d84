//! Buffer-trend adaptive bitrate selection.

mod buffer;
mod history;

pub use buffer::BufferAbrStrategy;
pub use history::RollingWindow;

use std::{sync::Mutex, time::Duration};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbrStatus {
    #[default]
    Idle,
    /// A switch has been requested and is waiting for the owner to confirm it
    Switching,
    LowestAlready,
    HighestAlready,
}

/// Playback state an ABR strategy samples on every tick.
///
/// Speeds are in bits per second.
pub trait AbrReferenceData: Send + Sync {
    fn current_buffer_duration(&self) -> Duration;
    fn max_buffer_duration(&self) -> Duration;
    fn is_rebuffering(&self) -> bool;
    fn is_connected(&self) -> bool;
    fn remaining_segment_count(&self) -> usize;
    fn current_download_speed(&self) -> u64;
    fn is_download_completed(&self) -> bool;
}

/// Plain values implementing [`AbrReferenceData`].
#[derive(Debug, Clone, Default)]
pub struct ReferenceSnapshot {
    pub buffer_duration: Duration,
    pub max_buffer_duration: Duration,
    pub rebuffering: bool,
    pub connected: bool,
    pub remaining_segments: usize,
    pub download_speed: u64,
    pub download_completed: bool,
}

impl AbrReferenceData for ReferenceSnapshot {
    fn current_buffer_duration(&self) -> Duration {
        self.buffer_duration
    }

    fn max_buffer_duration(&self) -> Duration {
        self.max_buffer_duration
    }

    fn is_rebuffering(&self) -> bool {
        self.rebuffering
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn remaining_segment_count(&self) -> usize {
        self.remaining_segments
    }

    fn current_download_speed(&self) -> u64 {
        self.download_speed
    }

    fn is_download_completed(&self) -> bool {
        self.download_completed
    }
}

impl<T: AbrReferenceData> AbrReferenceData for Mutex<T> {
    fn current_buffer_duration(&self) -> Duration {
        self.lock()
            .map(|r| r.current_buffer_duration())
            .unwrap_or_default()
    }

    fn max_buffer_duration(&self) -> Duration {
        self.lock()
            .map(|r| r.max_buffer_duration())
            .unwrap_or_default()
    }

    fn is_rebuffering(&self) -> bool {
        self.lock().map(|r| r.is_rebuffering()).unwrap_or_default()
    }

    fn is_connected(&self) -> bool {
        self.lock().map(|r| r.is_connected()).unwrap_or_default()
    }

    fn remaining_segment_count(&self) -> usize {
        self.lock()
            .map(|r| r.remaining_segment_count())
            .unwrap_or_default()
    }

    fn current_download_speed(&self) -> u64 {
        self.lock()
            .map(|r| r.current_download_speed())
            .unwrap_or_default()
    }

    fn is_download_completed(&self) -> bool {
        self.lock()
            .map(|r| r.is_download_completed())
            .unwrap_or_default()
    }
}

/// Receives the stream index to switch to.
pub type SwitchCallback = Box<dyn Fn(i32) + Send + Sync>;

pub type StatusCallback = Box<dyn Fn(AbrStatus) + Send + Sync>;

/// Diagnostic summary of the last committed switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchInfo {
    #[serde(rename = "fb")]
    pub from_bitrate: Option<u64>,
    #[serde(rename = "tb")]
    pub to_bitrate: Option<u64>,
    #[serde(rename = "spd")]
    pub speeds: Vec<u64>,
    #[serde(rename = "buf")]
    pub trend: Vec<i32>,
}

/// Bitrate selection driven by periodic ticks from the owner.
pub trait AbrStrategy {
    /// Registers a stream `index` encoded at `bitrate` bits per second.
    fn add_stream(&mut self, index: i32, bitrate: u64);

    /// Confirms that playback now runs at `bitrate`. Ends a pending switch.
    fn set_current_bitrate(&mut self, bitrate: u64);

    fn set_duration(&mut self, duration: Duration);

    fn set_reference_data(&mut self, reference: std::sync::Arc<dyn AbrReferenceData>);

    /// One sampling tick.
    fn process_abr_algo(&mut self);

    /// Forgets the samples and switch history but keeps the streams.
    fn reset(&mut self);

    /// Forgets everything, including the registered streams.
    fn clear(&mut self);
}
