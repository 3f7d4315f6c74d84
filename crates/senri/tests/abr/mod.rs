use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use senri::{
    abr::{AbrReferenceData, AbrStatus, AbrStrategy, BufferAbrStrategy},
    AbrConfig, HttpClient, HttpPlaylistFetcher, SegmentTracker, TrackerConfig,
};
use url::Url;
use wiremock::MockServer;

use crate::AssertWrapper;

/// A player that reads the segment count from a live tracker.
struct Player {
    tracker: Arc<SegmentTracker<HttpPlaylistFetcher>>,
    buffer: Mutex<Duration>,
}

impl AbrReferenceData for Player {
    fn current_buffer_duration(&self) -> Duration {
        *self.buffer.lock().unwrap()
    }

    fn max_buffer_duration(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn is_rebuffering(&self) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn remaining_segment_count(&self) -> usize {
        self.tracker.remaining_segment_count()
    }

    fn current_download_speed(&self) -> u64 {
        0
    }

    fn is_download_completed(&self) -> bool {
        false
    }
}

async fn live_tracker() -> anyhow::Result<(Arc<SegmentTracker<HttpPlaylistFetcher>>, MockServer)> {
    let server = MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::path("/live.m3u8"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:3\n#EXTINF:10,\na.ts\n#EXTINF:10,\nb.ts\n",
        ))
        .mount(&server)
        .await;

    let url: Url = format!("{}/live.m3u8", server.uri()).parse()?;
    let fetcher = HttpPlaylistFetcher::new(HttpClient::with_defaults()?);
    let tracker = SegmentTracker::from_url(fetcher, url, TrackerConfig::default());
    tracker.init().await?;
    Ok((Arc::new(tracker), server))
}

#[tokio::test]
async fn live_edge_allows_switching_up() -> anyhow::Result<()> {
    let (tracker, _server) = live_tracker().await?;
    let player = Arc::new(Player {
        tracker: tracker.clone(),
        buffer: Mutex::new(Duration::from_secs(8)),
    });

    let switches = Arc::new(Mutex::new(Vec::new()));
    let switches_ref = switches.clone();
    let mut abr = BufferAbrStrategy::new(AbrConfig::default(), move |index| {
        switches_ref.lock().unwrap().push(index)
    });
    abr.add_stream(0, 800_000);
    abr.add_stream(1, 1_600_000);
    abr.set_duration(Duration::from_micros(tracker.duration() as u64));
    abr.set_reference_data(player.clone());
    abr.set_current_bitrate(800_000);

    // segments left to fetch keep the steady buffer from counting as full,
    // the falling trend hits the lowest stream
    let now = Instant::now();
    for _ in 0..12 {
        abr.compute_buffer_trend(now);
    }
    assert!(switches.lock().unwrap().is_empty());
    assert_eq!(abr.status(), AbrStatus::LowestAlready);

    while tracker.get_next_segment().is_some() {}
    assert_eq!(tracker.remaining_segment_count(), 0);

    for _ in 0..8 {
        abr.compute_buffer_trend(now);
    }
    assert!(switches.lock().unwrap().is_empty());
    abr.compute_buffer_trend(now);
    assert_eq!(switches.lock().unwrap().clone(), vec![1]);
    assert_eq!(abr.status(), AbrStatus::Switching);

    let info = abr.switch_info();
    assert_eq!(info.from_bitrate, Some(800_000));
    assert_eq!(info.to_bitrate, Some(1_600_000));
    Ok(())
}

#[tokio::test]
async fn single_stream_never_switches() -> anyhow::Result<()> {
    let (tracker, _server) = live_tracker().await?;
    let player = Arc::new(Player {
        tracker,
        buffer: Mutex::new(Duration::from_millis(20)),
    });

    let mut abr = BufferAbrStrategy::new(AbrConfig::default(), |_| {
        panic!("switched with a single stream")
    });
    abr.add_stream(0, 800_000);
    abr.set_reference_data(player);
    abr.set_current_bitrate(800_000);
    for _ in 0..5 {
        abr.process_abr_algo();
    }
    abr.current_bitrate().assert_success();
    Ok(())
}
