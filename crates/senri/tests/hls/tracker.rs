use std::{sync::Arc, time::Duration};

use senri::{
    hls::parse_bytes, model::RenditionReport, PlaylistFetcher, SegmentTracker, SenriError,
    TrackerConfig,
};
use url::Url;
use wiremock::{
    matchers::{method, path, query_param, query_param_is_missing},
    Mock, MockServer, ResponseTemplate,
};

use super::{fetcher, setup_mock_server, HlsMock};
use crate::{init_test_tracing, AssertWrapper};

fn live_playlist(first: u64, count: u64, header: &str) -> String {
    let mut body = format!("#EXTM3U\n#EXT-X-TARGETDURATION:2\n{header}#EXT-X-MEDIA-SEQUENCE:{first}\n");
    for sequence in first..first + count {
        body.push_str(&format!("#EXTINF:2.0,\nseg{sequence}.ts\n"));
    }
    body
}

fn config() -> TrackerConfig {
    TrackerConfig {
        min_reload_interval: Duration::from_millis(100),
        ..Default::default()
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test]
async fn vod_variant_from_master() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/master.m3u8", include_str!("../fixtures/hls/master.m3u8"))
        .await
        .mock_media_playlist("/high/index.m3u8", &["a.ts", "b.ts"])
        .await;

    let fetcher = fetcher();
    let master_url: Url = format!("{}/master.m3u8", server.uri()).parse()?;
    let data = fetcher.fetch(&master_url).await?;
    let playlist = parse_bytes(&data, &master_url)?;
    let variant = playlist.periods[0].adaptation_sets[0]
        .representations
        .iter()
        .max_by_key(|r| r.bandwidth)
        .assert_success();

    let tracker = SegmentTracker::new(fetcher, variant, config());
    tracker.init().await?;
    assert!(tracker.is_inited());
    assert!(!tracker.is_live());
    assert_eq!(tracker.stream_info().width, 1280);
    assert_eq!(tracker.seg_size(), 2);
    assert_eq!(tracker.duration(), 18_018_000);

    let first = tracker.get_next_segment().assert_success();
    let rep = tracker.representation().assert_success();
    assert_eq!(rep.bandwidth, 2_560_000);
    assert_eq!(
        rep.resolve(&first.uri)?.as_str(),
        format!("{}/high/a.ts", server.uri())
    );

    tracker.get_next_segment().assert_success();
    tracker.get_next_segment().assert_error();
    assert_eq!(tracker.remaining_segment_count(), 0);
    Ok(())
}

#[tokio::test]
async fn init_fails_on_missing_playlist() -> anyhow::Result<()> {
    let (_, server) = setup_mock_server("#EXTM3U\n#EXTINF:1,\na.ts").await;
    let url: Url = format!("{}/missing.m3u8", server.uri()).parse()?;

    let tracker = SegmentTracker::from_url(fetcher(), url, config());
    assert!(matches!(
        tracker.init().await,
        Err(SenriError::PlaylistFetchError)
    ));
    assert!(!tracker.is_inited());
    tracker.get_next_segment().assert_error();
    Ok(())
}

#[tokio::test]
async fn blocking_reload_requests_next_segment() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    let header = "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES\n";
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .and(query_param("_HLS_msn", "12"))
        .and(query_param_is_missing("_HLS_part"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_playlist(10, 3, header)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .and(query_param_is_missing("_HLS_msn"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_playlist(10, 2, header)))
        .mount(&server)
        .await;

    let url: Url = format!("{}/live.m3u8", server.uri()).parse()?;
    let tracker = SegmentTracker::from_url(fetcher(), url, config());
    tracker.init().await?;
    assert!(tracker.is_live());
    assert_eq!(tracker.duration(), 0);
    assert_eq!(tracker.last_seg_num(), Some(11));

    wait_until(|| tracker.last_seg_num() == Some(12)).await;
    assert_eq!(tracker.first_seg_num(), Some(10));

    tracker.interrupt(true);
    assert!(tracker.is_interrupted());
    assert!(matches!(
        tracker.reload_playlist().await,
        Err(SenriError::Interrupted)
    ));
    Ok(())
}

#[tokio::test]
async fn rendition_report_seeds_blocking_reload() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    let header = "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES\n";
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .and(query_param("_HLS_msn", "20"))
        .and(query_param("_HLS_part", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_playlist(15, 6, header)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .and(query_param_is_missing("_HLS_msn"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_playlist(10, 2, header)))
        .mount(&server)
        .await;

    let url: Url = format!("{}/live.m3u8", server.uri()).parse()?;
    let tracker = SegmentTracker::from_url(fetcher(), url.clone(), config());
    tracker.set_rendition_info(vec![RenditionReport {
        uri: url.to_string(),
        last_msn: Some(20),
        last_part: Some(1),
    }]);
    tracker.init().await?;

    wait_until(|| tracker.last_seg_num() == Some(20)).await;
    // the cursor was behind the new window
    assert_eq!(tracker.get_next_segment().assert_success().sequence, 15);
    Ok(())
}

#[tokio::test]
async fn delta_update_is_merged() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    let header = "#EXT-X-SERVER-CONTROL:CAN-SKIP-UNTIL=12\n";
    let delta = format!(
        "#EXTM3U\n#EXT-X-TARGETDURATION:2\n{header}#EXT-X-MEDIA-SEQUENCE:10\n#EXT-X-SKIP:SKIPPED-SEGMENTS=2\n#EXTINF:2.0,\nseg12.ts\n#EXTINF:2.0,\nseg13.ts\n"
    );
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .and(query_param("_HLS_skip", "YES"))
        .respond_with(ResponseTemplate::new(200).set_body_string(delta))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .and(query_param_is_missing("_HLS_skip"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_playlist(10, 2, header)))
        .mount(&server)
        .await;

    let url: Url = format!("{}/live.m3u8", server.uri()).parse()?;
    let tracker = SegmentTracker::from_url(fetcher(), url, config());
    tracker.init().await?;

    wait_until(|| tracker.last_seg_num() == Some(13)).await;
    let uris: Vec<_> = tracker
        .segment_list()
        .into_iter()
        .map(|entry| entry.uri)
        .collect();
    assert_eq!(uris, vec!["seg10.ts", "seg11.ts", "seg12.ts", "seg13.ts"]);
    Ok(())
}

#[tokio::test]
async fn live_playlist_ends() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/event.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXT-X-TARGETDURATION:1\n#EXTINF:1.0,\na.ts\n#EXTINF:1.0,\nb.ts\n",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    server
        .mock(
            "/event.m3u8",
            "#EXTM3U\n#EXT-X-TARGETDURATION:1\n#EXTINF:1.0,\na.ts\n#EXTINF:1.0,\nb.ts\n#EXTINF:1.0,\nc.ts\n#EXT-X-ENDLIST\n",
        )
        .await;

    let url: Url = format!("{}/event.m3u8", server.uri()).parse()?;
    let tracker = SegmentTracker::from_url(fetcher(), url, config());
    tracker.init().await?;
    assert!(tracker.is_live());

    wait_until(|| !tracker.is_live()).await;
    let sequences: Vec<_> = std::iter::from_fn(|| tracker.get_next_segment())
        .map(|s| s.sequence)
        .collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert_eq!(tracker.duration(), 3_000_000);
    Ok(())
}

#[tokio::test]
async fn window_overrun_moves_cursor() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_playlist(0, 3, "")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    server.mock("/live.m3u8", live_playlist(5, 3, "")).await;

    let url: Url = format!("{}/live.m3u8", server.uri()).parse()?;
    let tracker = SegmentTracker::from_url(fetcher(), url, config());
    tracker.init().await?;
    assert_eq!(tracker.get_next_segment().assert_success().sequence, 0);

    tracker.reload_playlist().await?;
    assert_eq!(tracker.first_seg_num(), Some(5));
    assert_eq!(tracker.get_next_segment().assert_success().sequence, 5);
    assert_eq!(tracker.remaining_segment_count(), 2);
    Ok(())
}

#[tokio::test]
async fn interrupt_cancels_pending_blocking_reload() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    let header = "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES\n";
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .and(query_param("_HLS_msn", "12"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(live_playlist(10, 3, header))
                .set_delay(Duration::from_secs(60)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .and(query_param_is_missing("_HLS_msn"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_playlist(10, 2, header)))
        .mount(&server)
        .await;

    let url: Url = format!("{}/live.m3u8", server.uri()).parse()?;
    let tracker = Arc::new(SegmentTracker::from_url(fetcher(), url, config()));
    tracker.init().await?;

    let pending = tokio::spawn({
        let tracker = tracker.clone();
        async move { tracker.reload_playlist().await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!pending.is_finished());

    tracker.interrupt(true);
    let result = tokio::time::timeout(Duration::from_secs(5), pending).await??;
    assert!(matches!(result, Err(SenriError::Interrupted)));
    assert_eq!(tracker.last_seg_num(), Some(11));
    assert_eq!(tracker.reload_failing_since(), None);
    Ok(())
}
