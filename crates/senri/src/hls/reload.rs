//! Reload scheduling of live media playlists.

use std::time::Duration;

use tokio::time::Instant;
use url::Url;

use crate::{
    config::TrackerConfig,
    model::{RenditionReport, Representation},
    util::time::ticks_to_duration,
};

/// Media sequence number and part index a blocking reload waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockingTarget {
    pub msn: u64,
    pub part: Option<u64>,
}

/// Bookkeeping between two playlist loads.
#[derive(Debug, Default)]
pub(crate) struct ReloadState {
    pub last_load: Option<Instant>,
    /// Whether the last load returned the same live edge as the one before
    pub unchanged: bool,
    /// Start of the current run of failed reloads
    pub failed_since: Option<Instant>,
    pub need_reload_without_skip: bool,
}

impl ReloadState {
    pub fn record_success(&mut self, now: Instant, unchanged: bool) {
        self.last_load = Some(now);
        self.unchanged = unchanged;
        self.failed_since = None;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.last_load = Some(now);
        self.failed_since.get_or_insert(now);
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.last_load
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::MAX)
    }
}

/// The next segment or part the server has not published yet.
pub(crate) fn next_blocking_target(rep: &Representation) -> Option<BlockingTarget> {
    let last = rep.segment_list.as_ref()?.segments().last()?;

    Some(if last.is_in_progress() {
        BlockingTarget {
            msn: last.sequence,
            part: Some(last.parts.len() as u64),
        }
    } else if rep.is_low_latency() {
        BlockingTarget {
            msn: last.sequence.saturating_add(1),
            part: Some(0),
        }
    } else {
        BlockingTarget {
            msn: last.sequence.saturating_add(1),
            part: None,
        }
    })
}

/// A sibling's report about `rep` that is ahead of what `rep` already holds.
pub(crate) fn reported_target(
    rep: &Representation,
    reports: &[RenditionReport],
) -> Option<BlockingTarget> {
    let current = rep
        .segment_list
        .as_ref()
        .and_then(|l| l.last_seq_num())
        .unwrap_or_default();

    reports
        .iter()
        .filter(|r| same_playlist(&r.uri, &rep.playlist_url))
        .find_map(|r| {
            let msn = r.last_msn.filter(|msn| *msn >= current)?;
            Some(BlockingTarget {
                msn,
                part: r.last_part,
            })
        })
}

fn same_playlist(uri: &str, playlist_url: &Url) -> bool {
    let Ok(mut uri) = Url::parse(uri) else {
        return false;
    };
    let mut playlist_url = playlist_url.clone();
    uri.set_query(None);
    playlist_url.set_query(None);
    uri == playlist_url
}

/// Whether a delta update may be requested `elapsed` after the previous load.
pub(crate) fn can_request_skip(rep: &Representation, elapsed: Duration) -> bool {
    let skip_until = rep.server_control.can_skip_until;
    skip_until > 0. && elapsed.as_secs_f64() < skip_until / 2.
}

/// `playlist_url` with the low-latency delivery directives appended.
pub(crate) fn reload_url(playlist_url: &Url, target: Option<BlockingTarget>, skip: bool) -> Url {
    let retained: Vec<(String, String)> = playlist_url
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("_HLS_"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = playlist_url.clone();
    url.set_query(None);
    if retained.is_empty() && target.is_none() && !skip {
        return url;
    }

    {
        let mut query = url.query_pairs_mut();
        query.extend_pairs(retained);
        if let Some(target) = target {
            query.append_pair("_HLS_msn", &target.msn.to_string());
            if let Some(part) = target.part {
                query.append_pair("_HLS_part", &part.to_string());
            }
        }
        if skip {
            query.append_pair("_HLS_skip", "YES");
        }
    }
    url
}

/// Inputs of [`reload_interval`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct IntervalInput {
    pub blocking: bool,
    pub need_reload_without_skip: bool,
    pub unchanged: bool,
    pub near_edge: bool,
    pub failed: bool,
    pub elapsed: Duration,
}

/// Time to wait before the next reload of `rep`.
pub(crate) fn reload_interval(
    rep: &Representation,
    input: IntervalInput,
    config: &TrackerConfig,
) -> Duration {
    if input.need_reload_without_skip || (input.blocking && !input.failed && !input.unchanged) {
        return Duration::ZERO;
    }

    let mut interval = if rep.is_low_latency() {
        ticks_to_duration(rep.part_target_duration)
    } else if rep.target_duration > 0 {
        ticks_to_duration(rep.target_duration)
    } else {
        config.default_target_duration
    };
    if interval.is_zero() {
        interval = config.default_part_target_duration;
    }

    if input.unchanged || input.near_edge || input.failed {
        interval /= 2;
    }

    interval
        .saturating_sub(input.elapsed)
        .max(config.min_reload_interval)
}
