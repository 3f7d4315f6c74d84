use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use super::{
    AbrReferenceData, AbrStatus, AbrStrategy, RollingWindow, StatusCallback, SwitchCallback,
    SwitchInfo,
};
use crate::{config::AbrConfig, error::SenriResult};

/// Switches bitrate on the trend of the playback buffer, using download
/// speed samples to choose how far to move.
pub struct BufferAbrStrategy {
    config: AbrConfig,
    on_switch: SwitchCallback,
    on_status: Option<StatusCallback>,
    reference: Option<Arc<dyn AbrReferenceData>>,

    /// Ascending, without duplicates
    bitrates: Vec<u64>,
    stream_index: HashMap<u64, i32>,
    current_bitrate: Option<u64>,
    previous_bitrate: Option<u64>,
    duration: Duration,
    status: AbrStatus,

    switching: bool,
    last_switch: Option<Instant>,
    last_buffer: Option<Duration>,
    trend: RollingWindow<i32>,
    speeds: RollingWindow<u64>,
    /// `true` for a switch up
    up_history: RollingWindow<bool>,
    up_cooldown: Duration,
}

impl BufferAbrStrategy {
    pub fn new<F>(config: AbrConfig, on_switch: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        Self {
            trend: RollingWindow::new(config.trend_window),
            speeds: RollingWindow::new(config.speed_window),
            up_history: RollingWindow::new(config.history_window),
            up_cooldown: config.up_cooldown_after_up,
            config,
            on_switch: Box::new(on_switch),
            on_status: None,
            reference: None,
            bitrates: Vec::new(),
            stream_index: HashMap::new(),
            current_bitrate: None,
            previous_bitrate: None,
            duration: Duration::ZERO,
            status: AbrStatus::Idle,
            switching: false,
            last_switch: None,
            last_buffer: None,
        }
    }

    pub fn with_status_callback<F>(mut self, on_status: F) -> Self
    where
        F: Fn(AbrStatus) + Send + Sync + 'static,
    {
        self.on_status = Some(Box::new(on_status));
        self
    }

    pub fn status(&self) -> AbrStatus {
        self.status
    }

    pub fn current_bitrate(&self) -> Option<u64> {
        self.current_bitrate
    }

    pub fn bitrates(&self) -> &[u64] {
        &self.bitrates
    }

    pub fn is_switching(&self) -> bool {
        self.switching
    }

    pub fn switch_info(&self) -> SwitchInfo {
        SwitchInfo {
            from_bitrate: self.previous_bitrate,
            to_bitrate: self.current_bitrate,
            speeds: self.speeds.to_vec(),
            trend: self.trend.to_vec(),
        }
    }

    pub fn switch_info_json(&self) -> SenriResult<String> {
        Ok(serde_json::to_string(&self.switch_info())?)
    }

    /// Samples the reference data once and switches if the trend calls for it.
    ///
    /// `now` is compared against the time the last switch was confirmed.
    pub fn compute_buffer_trend(&mut self, now: Instant) {
        if self.switching || self.bitrates.len() < 2 {
            return;
        }
        let Some(reference) = self.reference.clone() else {
            return;
        };
        if reference.is_download_completed() {
            return;
        }
        let Some(last_switch) = self.last_switch else {
            return;
        };

        let buffer = reference.current_buffer_duration();
        let Some(last_buffer) = self.last_buffer.replace(buffer) else {
            return;
        };

        let max_buffer = reference.max_buffer_duration();
        let mut full = !max_buffer.is_zero()
            && buffer >= max_buffer.saturating_sub(self.config.full_buffer_margin);
        if !full && self.duration.is_zero() && reference.is_connected() {
            // a live stream with nothing left to fetch cannot buffer more
            full = reference.remaining_segment_count() == 0;
        }

        if !full {
            self.speeds.push(reference.current_download_speed());
        }

        let rising = !reference.is_rebuffering() && (full || buffer > last_buffer);
        self.trend.push(if rising { 1 } else { -1 });

        let sum = self.trend.sum();
        let window = self.config.trend_window as i32;
        if buffer <= self.config.starvation_buffer
            || (buffer < self.config.lower_switch_buffer && sum <= -(window - 2))
        {
            tracing::debug!(
                "Buffer {}ms with trend {sum}, switching down",
                buffer.as_millis()
            );
            self.switch_bitrate(false);
        } else if (buffer >= self.config.upper_switch_buffer || full) && sum >= window - 2 {
            if self.up_history.last() == Some(&false)
                && (now.saturating_duration_since(last_switch) < self.up_cooldown || sum < window)
            {
                return;
            }
            tracing::debug!(
                "Buffer {}ms with trend {sum}, switching up",
                buffer.as_millis()
            );
            self.switch_bitrate(true);
        }
    }

    fn switch_bitrate(&mut self, up: bool) {
        let Some(current) = self.current_bitrate else {
            return;
        };
        let Some(position) = self.bitrates.iter().position(|b| *b == current) else {
            tracing::debug!("Current bitrate {current} is not a registered stream");
            return;
        };
        let speed = self.average_speed();

        let target = if up {
            let Some(mut target) = self.bitrates.get(position + 1).copied() else {
                self.update_status(AbrStatus::HighestAlready, false);
                return;
            };
            if speed > 0 && self.up_history.last() == Some(&false) && self.max_speed() < target {
                return;
            }
            for bitrate in &self.bitrates[position + 2..] {
                if speed >= *bitrate {
                    target = *bitrate;
                }
            }
            target
        } else {
            if position == 0 {
                self.update_status(AbrStatus::LowestAlready, false);
                return;
            }
            let lowest = self.bitrates[0];
            if self.max_speed() == 0 {
                lowest
            } else {
                self.bitrates[..position]
                    .iter()
                    .rev()
                    .find(|b| **b <= speed)
                    .copied()
                    .unwrap_or(lowest)
            }
        };

        self.commit(current, target, up);
    }

    fn commit(&mut self, from: u64, to: u64, up: bool) {
        self.previous_bitrate = Some(from);
        self.current_bitrate = Some(to);
        self.switching = true;
        self.trend.clear();
        self.up_history.push(up);
        self.up_cooldown = if up {
            self.config.up_cooldown_after_up
        } else {
            self.config.up_cooldown_after_down
        };

        log::info!("Switching bitrate from {from} to {to}");
        self.update_status(AbrStatus::Switching, true);
        if let Some(index) = self.stream_index.get(&to) {
            (self.on_switch)(*index);
        }
    }

    fn update_status(&mut self, status: AbrStatus, force: bool) {
        if !force && self.status == status {
            return;
        }
        self.status = status;
        if let Some(on_status) = &self.on_status {
            on_status(status);
        }
    }

    /// Mean of the fastest two thirds of the speed samples.
    fn average_speed(&self) -> u64 {
        let mut speeds = self.speeds.to_vec();
        if speeds.is_empty() {
            return 0;
        }
        speeds.sort_unstable_by(|a, b| b.cmp(a));
        let keep = speeds.len() - speeds.len() / 3;
        speeds[..keep].iter().sum::<u64>() / keep as u64
    }

    fn max_speed(&self) -> u64 {
        self.speeds.iter().copied().max().unwrap_or_default()
    }
}

impl AbrStrategy for BufferAbrStrategy {
    fn add_stream(&mut self, index: i32, bitrate: u64) {
        if let Err(position) = self.bitrates.binary_search(&bitrate) {
            self.bitrates.insert(position, bitrate);
        }
        self.stream_index.insert(bitrate, index);
    }

    fn set_current_bitrate(&mut self, bitrate: u64) {
        self.current_bitrate = Some(bitrate);
        self.last_switch = Some(Instant::now());
        self.last_buffer = None;
        if self.switching {
            self.switching = false;
            self.update_status(AbrStatus::Idle, false);
        }
    }

    fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    fn set_reference_data(&mut self, reference: Arc<dyn AbrReferenceData>) {
        self.reference = Some(reference);
    }

    fn process_abr_algo(&mut self) {
        if self.reference.is_none() || self.current_bitrate.is_none() || self.bitrates.len() < 2 {
            return;
        }
        self.compute_buffer_trend(Instant::now());
    }

    fn reset(&mut self) {
        self.switching = false;
        self.last_switch = None;
        self.last_buffer = None;
        self.trend.clear();
        self.speeds.clear();
        self.up_history.clear();
        self.up_cooldown = self.config.up_cooldown_after_up;
        self.status = AbrStatus::Idle;
    }

    fn clear(&mut self) {
        self.reset();
        self.bitrates.clear();
        self.stream_index.clear();
        self.current_bitrate = None;
        self.previous_bitrate = None;
    }
}
