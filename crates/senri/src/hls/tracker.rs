use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use bytes::Bytes;
use tokio::{sync::Notify, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{
    parser::parse_bytes,
    reload::{self, BlockingTarget, IntervalInput, ReloadState},
};
use crate::{
    config::TrackerConfig,
    error::{SenriError, SenriResult},
    fetch::PlaylistFetcher,
    model::{
        PreloadHint, RenditionReport, Representation, Segment, SegmentListEntry, StreamInfo,
        StreamType,
    },
};

/// Owns the lifecycle of one media playlist.
///
/// The tracker keeps the latest parsed [`Representation`] as an immutable
/// snapshot, a cursor over its segments and, for live playlists, a background
/// task reloading the playlist. Dropping the tracker stops that task.
pub struct SegmentTracker<F: PlaylistFetcher> {
    inner: Arc<Inner<F>>,
}

struct Inner<F> {
    fetcher: F,
    config: TrackerConfig,
    /// Variant attributes from the master playlist, carried onto every snapshot
    descriptor: Representation,

    state: Mutex<TrackerState>,
    /// Serialises playlist loads of the background loop and of callers
    loading: tokio::sync::Mutex<()>,
    need_update: Notify,

    shutdown: CancellationToken,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct TrackerState {
    rep: Option<Arc<Representation>>,
    initial_playlist: Option<Bytes>,

    cur_seg_num: u64,
    cur_seg_pos: u64,
    /// Parts of the segment at the cursor already handed out
    cur_part: usize,
    seeked: bool,

    reload: ReloadState,
    renditions: Vec<RenditionReport>,

    last_hint: Option<PreloadHint>,
    preload: Option<PreloadHint>,

    interrupt: CancellationToken,
}

impl<F: PlaylistFetcher> SegmentTracker<F> {
    /// Tracker for the media playlist of `descriptor`, usually a variant taken
    /// from a parsed master playlist.
    pub fn new(fetcher: F, descriptor: &Representation, config: TrackerConfig) -> Self {
        let shutdown = CancellationToken::new();
        let state = TrackerState {
            interrupt: shutdown.child_token(),
            ..Default::default()
        };

        Self {
            inner: Arc::new(Inner {
                fetcher,
                config,
                descriptor: descriptor.clone(),
                state: Mutex::new(state),
                loading: tokio::sync::Mutex::new(()),
                need_update: Notify::new(),
                shutdown,
                refresh_task: Mutex::new(None),
            }),
        }
    }

    pub fn from_url(fetcher: F, playlist_url: Url, config: TrackerConfig) -> Self {
        Self::new(fetcher, &Representation::new(playlist_url), config)
    }

    /// Uses `data` as the first playlist instead of fetching it.
    pub fn with_initial_playlist(self, data: Bytes) -> Self {
        self.inner.lock_state().initial_playlist = Some(data);
        self
    }

    /// Loads the playlist for the first time and, for live playlists, starts
    /// the background reload task.
    pub async fn init(&self) -> SenriResult<()> {
        if self.is_inited() {
            return Ok(());
        }

        self.inner.load_playlist(true).await?;
        if self.is_live() {
            self.spawn_refresh_task();
        }
        Ok(())
    }

    pub fn is_inited(&self) -> bool {
        self.inner.lock_state().rep.is_some()
    }

    /// Latest playlist snapshot.
    pub fn representation(&self) -> Option<Arc<Representation>> {
        self.inner.lock_state().rep.clone()
    }

    /// Segment at the cursor. The cursor moves past it.
    ///
    /// A segment still being published is handed out with the parts known so
    /// far and the cursor stays on it. Later calls return only the parts
    /// published since then, as a segment with an empty URI, until the segment
    /// completes.
    pub fn get_next_segment(&self) -> Option<Arc<Segment>> {
        let segment = self
            .inner
            .lock_state()
            .next_segment(&self.inner.descriptor.playlist_url);

        if segment.is_none() && self.is_live() {
            self.inner.need_update.notify_one();
        }
        segment
    }

    /// Segment at the cursor without moving it.
    ///
    /// With `force`, a live playlist whose cursor is past the last known
    /// segment is reloaded before giving up.
    pub async fn get_cur_segment(&self, force: bool) -> SenriResult<Option<Arc<Segment>>> {
        let segment = self
            .inner
            .lock_state()
            .segment_at_cursor(&self.inner.descriptor.playlist_url);
        if segment.is_some() || !force || !self.is_live() {
            return Ok(segment);
        }

        self.reload_playlist().await?;
        Ok(self
            .inner
            .lock_state()
            .segment_at_cursor(&self.inner.descriptor.playlist_url))
    }

    pub fn set_cur_seg_num(&self, num: u64) {
        let mut state = self.inner.lock_state();
        state.seeked = true;
        state.move_cursor(num);
    }

    pub fn cur_seg_num(&self) -> u64 {
        self.inner.lock_state().cur_seg_num
    }

    pub fn is_seeked(&self) -> bool {
        self.inner.lock_state().seeked
    }

    /// Byte offset already consumed inside the current segment.
    pub fn cur_seg_position(&self) -> u64 {
        self.inner.lock_state().cur_seg_pos
    }

    pub fn set_cur_seg_position(&self, position: u64) {
        self.inner.lock_state().cur_seg_pos = position;
    }

    /// Fetches and parses the playlist now, outside the reload schedule.
    pub async fn reload_playlist(&self) -> SenriResult<()> {
        self.inner.load_playlist(false).await
    }

    /// Places the cursor `live_start_index` segments behind the last one.
    /// Negative values count from one past the last segment, so `-3` leaves
    /// three segments to play.
    pub fn move_to_live_start_segment(&self, live_start_index: i64) {
        let mut state = self.inner.lock_state();
        let Some((first, last)) = state.rep.as_ref().and_then(|rep| {
            let list = rep.segment_list.as_ref()?;
            Some((list.first_seq_num()?, list.last_seq_num()?))
        }) else {
            return;
        };

        let target = if live_start_index >= 0 {
            last.saturating_sub(live_start_index as u64)
        } else {
            last.saturating_add(1)
                .saturating_sub(live_start_index.unsigned_abs())
        };
        state.move_cursor(target.max(first));
        tracing::debug!(
            url = %self.inner.descriptor.playlist_url,
            first,
            last,
            cursor = state.cur_seg_num,
            "Moved to live start segment"
        );
    }

    /// Starts from the configured live start index.
    pub fn move_to_default_live_start(&self) {
        self.move_to_live_start_segment(self.inner.config.live_start_index);
    }

    pub fn has_preload_segment(&self) -> bool {
        self.inner.lock_state().preload.is_some()
    }

    /// Takes the latest preload hint, with its URI resolved. Each hint is
    /// handed out once.
    pub fn use_preload_segment(&self) -> Option<PreloadHint> {
        self.inner.lock_state().preload.take()
    }

    /// Reports about sibling renditions from the latest snapshot, with
    /// absolute URIs.
    pub fn rendition_info(&self) -> Vec<RenditionReport> {
        let Some(rep) = self.representation() else {
            return Vec::new();
        };
        rep.rendition_reports
            .iter()
            .filter_map(|report| {
                Some(RenditionReport {
                    uri: rep.resolve(&report.uri).ok()?.to_string(),
                    ..report.clone()
                })
            })
            .collect()
    }

    /// Reports collected by a sibling tracker. A report about this playlist
    /// turns the next reload into a blocking one up to the reported position.
    pub fn set_rendition_info(&self, renditions: Vec<RenditionReport>) {
        self.inner.lock_state().renditions = renditions;
    }

    /// Stops (`true`) or resumes (`false`) all playlist activity.
    pub fn interrupt(&self, interrupted: bool) {
        if interrupted {
            let token = self.inner.lock_state().interrupt.clone();
            token.cancel();
            self.inner.need_update.notify_waiters();
            return;
        }

        let resumed = {
            let mut state = self.inner.lock_state();
            if !state.interrupt.is_cancelled() || self.inner.shutdown.is_cancelled() {
                return;
            }
            state.interrupt = self.inner.shutdown.child_token();
            state.rep.as_ref().is_some_and(|rep| rep.live)
        };
        if resumed {
            self.spawn_refresh_task();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.lock_state().interrupt.is_cancelled()
    }

    /// Start of the current run of failed reloads.
    pub fn reload_failing_since(&self) -> Option<Instant> {
        self.inner.lock_state().reload.failed_since
    }

    /// Whether reloads have kept failing for longer than the configured timeout.
    pub fn is_reload_stalled(&self) -> bool {
        self.reload_failing_since()
            .is_some_and(|since| since.elapsed() >= self.inner.config.reload_failure_timeout)
    }

    pub fn is_live(&self) -> bool {
        self.representation().is_some_and(|rep| rep.live)
    }

    pub fn stream_type(&self) -> StreamType {
        self.inner.descriptor.stream_type
    }

    pub fn playlist_url(&self) -> &Url {
        &self.inner.descriptor.playlist_url
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.descriptor.base_url
    }

    pub fn stream_info(&self) -> StreamInfo {
        self.inner.descriptor.stream_info()
    }

    pub fn description(&self) -> String {
        self.inner.descriptor.description()
    }

    /// Ticks. Zero for live playlists.
    pub fn duration(&self) -> i64 {
        self.representation()
            .filter(|rep| !rep.live)
            .and_then(|rep| rep.segment_list.as_ref().map(|l| l.total_duration()))
            .unwrap_or_default()
    }

    /// Ticks
    pub fn target_duration(&self) -> i64 {
        self.representation()
            .map(|rep| rep.target_duration)
            .unwrap_or_default()
    }

    pub fn segment_number_by_time(&self, time: i64) -> Option<u64> {
        self.representation()?
            .segment_list
            .as_ref()?
            .segment_number_by_time(time)
    }

    pub fn first_seg_num(&self) -> Option<u64> {
        self.representation()?.segment_list.as_ref()?.first_seq_num()
    }

    pub fn last_seg_num(&self) -> Option<u64> {
        self.representation()?.segment_list.as_ref()?.last_seq_num()
    }

    pub fn seg_size(&self) -> usize {
        self.representation()
            .and_then(|rep| rep.segment_list.as_ref().map(|l| l.len()))
            .unwrap_or_default()
    }

    /// Segments from the cursor to the end of the current snapshot.
    pub fn remaining_segment_count(&self) -> usize {
        let state = self.inner.lock_state();
        state
            .rep
            .as_ref()
            .and_then(|rep| rep.segment_list.as_ref())
            .map(|l| l.remaining_from(state.cur_seg_num))
            .unwrap_or_default()
    }

    pub fn segment_list(&self) -> Vec<SegmentListEntry> {
        self.representation()
            .and_then(|rep| rep.segment_list.as_ref().map(|l| l.entries()))
            .unwrap_or_default()
    }

    fn spawn_refresh_task(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime, live playlist will not be refreshed");
            return;
        };

        let token = self.inner.lock_state().interrupt.clone();
        let handle = runtime.spawn(refresh_loop(self.inner.clone(), token));
        let previous = self
            .inner
            .refresh_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl<F: PlaylistFetcher> Drop for SegmentTracker<F> {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

async fn refresh_loop<F: PlaylistFetcher>(inner: Arc<Inner<F>>, token: CancellationToken) {
    tracing::debug!(url = %inner.descriptor.playlist_url, "Playlist refresh started");

    loop {
        let interval = inner.reload_interval();
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
            _ = inner.need_update.notified() => {
                // keep a minimal gap between loads
                let wait = inner.config.min_reload_interval.saturating_sub(inner.elapsed());
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        match inner.load_playlist(false).await {
            Ok(()) => {
                if !inner.is_live() {
                    tracing::info!(url = %inner.descriptor.playlist_url, "Playlist ended");
                    break;
                }
            }
            Err(SenriError::Interrupted) => break,
            Err(error) => {
                tracing::warn!(url = %inner.descriptor.playlist_url, %error, "Failed to reload playlist");
            }
        }
    }

    tracing::debug!(url = %inner.descriptor.playlist_url, "Playlist refresh stopped");
}

impl<F: PlaylistFetcher> Inner<F> {
    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_live(&self) -> bool {
        self.lock_state().rep.as_ref().is_some_and(|rep| rep.live)
    }

    fn elapsed(&self) -> Duration {
        self.lock_state().reload.elapsed(Instant::now())
    }

    fn reload_interval(&self) -> Duration {
        let state = self.lock_state();
        let Some(rep) = state.rep.as_ref() else {
            return Duration::ZERO;
        };

        let near_edge = rep
            .segment_list
            .as_ref()
            .and_then(|l| l.last_seq_num())
            .is_some_and(|last| state.cur_seg_num.saturating_add(1) >= last);
        let input = IntervalInput {
            blocking: rep.server_control.can_block_reload
                && reload::next_blocking_target(rep).is_some(),
            need_reload_without_skip: state.reload.need_reload_without_skip,
            unchanged: state.reload.unchanged,
            near_edge,
            failed: state.reload.failed_since.is_some(),
            elapsed: state.reload.elapsed(Instant::now()),
        };
        reload::reload_interval(rep, input, &self.config)
    }

    /// URL of the next load and whether the server is asked to hold it.
    fn next_request(&self, no_skip: bool) -> (Url, Option<BlockingTarget>) {
        let mut state = self.lock_state();
        let Some(rep) = state.rep.clone() else {
            return (self.descriptor.playlist_url.clone(), None);
        };
        if !rep.live {
            return (rep.playlist_url.clone(), None);
        }

        let target = if rep.server_control.can_block_reload && !state.reload.unchanged {
            let reported = reload::reported_target(&rep, &state.renditions);
            if reported.is_some() {
                state.renditions.clear();
            }
            reported.or_else(|| reload::next_blocking_target(&rep))
        } else {
            None
        };
        let skip = !no_skip
            && !state.reload.need_reload_without_skip
            && reload::can_request_skip(&rep, state.reload.elapsed(Instant::now()));

        (
            reload::reload_url(&rep.playlist_url, target, skip),
            target,
        )
    }

    async fn load_playlist(&self, no_skip: bool) -> SenriResult<()> {
        let token = self.lock_state().interrupt.clone();
        let _loading = tokio::select! {
            _ = token.cancelled() => return Err(SenriError::Interrupted),
            guard = self.loading.lock() => guard,
        };

        match self.fetch_and_apply(&token, no_skip).await {
            Err(SenriError::SkipMergeFailed { missing }) if !no_skip => {
                tracing::warn!(
                    url = %self.descriptor.playlist_url,
                    missing,
                    "Can not merge delta playlist, reloading without skip"
                );
                self.lock_state().reload.need_reload_without_skip = true;
                self.fetch_and_apply(&token, true).await
            }
            result => result,
        }
    }

    async fn fetch_and_apply(&self, token: &CancellationToken, no_skip: bool) -> SenriResult<()> {
        if token.is_cancelled() {
            return Err(SenriError::Interrupted);
        }

        let result = match self.fetch(token, no_skip).await {
            Ok(data) => self.apply(&data),
            Err(SenriError::Interrupted) => return Err(SenriError::Interrupted),
            Err(e) => Err(e),
        };

        if let Err(error) = &result {
            let mut state = self.lock_state();
            state.reload.record_failure(Instant::now());
            tracing::debug!(
                url = %self.descriptor.playlist_url,
                %error,
                since = ?state.reload.failed_since,
                "Playlist load failed"
            );
        }
        result
    }

    async fn fetch(&self, token: &CancellationToken, no_skip: bool) -> SenriResult<Bytes> {
        if let Some(data) = self.lock_state().initial_playlist.take() {
            return Ok(data);
        }

        let (url, target) = self.next_request(no_skip);
        tracing::trace!(%url, ?target, "Loading playlist");

        let fetch = self.fetcher.fetch(&url);
        let fetch = async {
            match target {
                Some(_) => {
                    match tokio::time::timeout(self.config.blocking_reload_timeout, fetch).await {
                        Ok(result) => result,
                        Err(_) => Err(SenriError::ReloadTimeout),
                    }
                }
                None => fetch.await,
            }
        };

        tokio::select! {
            _ = token.cancelled() => Err(SenriError::Interrupted),
            result = fetch => result,
        }
    }

    /// Parses `data` and swaps it in as the current snapshot.
    fn apply(&self, data: &[u8]) -> SenriResult<()> {
        let playlist = parse_bytes(data, &self.descriptor.playlist_url)?;
        if playlist.is_master {
            return Err(SenriError::InvalidManifest(format!(
                "{} is a master playlist",
                self.descriptor.playlist_url
            )));
        }
        let mut rep = playlist
            .into_first_representation()
            .ok_or(SenriError::NoRepresentation)?;
        rep.inherit_master_attributes(&self.descriptor);

        let mut state = self.lock_state();
        if rep.skipped_segments > 0 {
            let previous = state
                .rep
                .as_ref()
                .and_then(|previous| previous.segment_list.as_ref());
            let merged = match (previous, rep.segment_list.as_ref()) {
                (Some(previous), Some(delta)) => delta.merge_skipped(previous, rep.skipped_segments)?,
                _ => {
                    return Err(SenriError::SkipMergeFailed {
                        missing: rep.skipped_segments,
                    })
                }
            };
            rep.segment_list = Some(merged);
        }
        state.reload.need_reload_without_skip = false;

        let edge = |rep: &Representation| {
            rep.segment_list
                .as_ref()
                .and_then(|l| l.segments().last())
                .map(|s| (s.sequence, s.parts.len()))
        };
        let unchanged = state.rep.as_ref().is_some_and(|previous| edge(previous) == edge(&rep));
        state.reload.record_success(Instant::now(), unchanged);

        if let Some(first) = rep.segment_list.as_ref().and_then(|l| l.first_seq_num()) {
            if state.seeked {
                state.seeked = false;
            } else if state.cur_seg_num < first {
                if state.rep.is_some() {
                    tracing::info!(
                        url = %self.descriptor.playlist_url,
                        cursor = state.cur_seg_num,
                        first,
                        "Live window overrun, skipping to the first available segment"
                    );
                }
                state.move_cursor(first);
            }
        }

        if rep.preload_hint != state.last_hint {
            state.last_hint = rep.preload_hint.clone();
            state.preload = rep.preload_hint.as_ref().and_then(|hint| {
                Some(PreloadHint {
                    uri: rep.resolve(&hint.uri).ok()?.to_string(),
                    ..hint.clone()
                })
            });
        }

        state.rep = Some(Arc::new(rep));
        Ok(())
    }
}

impl TrackerState {
    fn segment_at_cursor(&mut self, playlist_url: &Url) -> Option<Arc<Segment>> {
        let list = self.rep.as_ref()?.segment_list.as_ref()?;
        if let Some(segment) = list.get(self.cur_seg_num) {
            return Some(segment);
        }

        let first = list.first_seq_num()?;
        if self.cur_seg_num >= first {
            return None;
        }
        tracing::info!(
            url = %playlist_url,
            cursor = self.cur_seg_num,
            first,
            "Cursor fell behind the live window"
        );
        let segment = list.first_at_or_after(self.cur_seg_num)?;
        self.move_cursor(segment.sequence);
        Some(segment)
    }

    fn move_cursor(&mut self, sequence: u64) {
        self.cur_seg_num = sequence;
        self.cur_seg_pos = 0;
        self.cur_part = 0;
    }

    fn next_segment(&mut self, playlist_url: &Url) -> Option<Arc<Segment>> {
        loop {
            let segment = self.segment_at_cursor(playlist_url)?;
            let in_progress = segment.is_in_progress();
            let next = if self.cur_part == 0 {
                segment.clone()
            } else if self.cur_part < segment.parts.len() {
                Arc::new(segment.remaining_parts(self.cur_part))
            } else if in_progress {
                // nothing new since the last call
                return None;
            } else {
                // completed after all its parts went out
                self.move_cursor(segment.sequence.saturating_add(1));
                continue;
            };

            if in_progress {
                self.cur_part = segment.parts.len();
            } else {
                self.move_cursor(segment.sequence.saturating_add(1));
            }
            return Some(next);
        }
    }
}
