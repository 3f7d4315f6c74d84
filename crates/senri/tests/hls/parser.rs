use senri::{
    hls::parse_bytes,
    model::{EncryptionMethod, Playlist, StreamType},
    util::range::ByteRange,
    SenriError, CLOCK_FREQ,
};
use url::Url;

use crate::AssertWrapper;

fn parse_fixture(data: &str) -> Playlist {
    let url: Url = "https://example.com/live/index.m3u8".parse().unwrap();
    parse_bytes(data.as_bytes(), &url).assert_success()
}

const FIXTURES: [&str; 5] = [
    include_str!("../fixtures/hls/vod.m3u8"),
    include_str!("../fixtures/hls/byterange.m3u8"),
    include_str!("../fixtures/hls/encrypted.m3u8"),
    include_str!("../fixtures/hls/low_latency.m3u8"),
    include_str!("../fixtures/hls/master.m3u8"),
];

#[test]
fn vod_with_target_duration_only() {
    let playlist = parse_fixture(include_str!("../fixtures/hls/vod.m3u8"));
    assert!(!playlist.is_master);
    assert_eq!(playlist.duration, 60 * CLOCK_FREQ);

    let rep = playlist.into_first_representation().assert_success();
    assert!(!rep.live);
    assert_eq!(rep.version, Some(3));
    assert_eq!(rep.stream_type, StreamType::Mixed);

    let list = rep.segment_list.assert_success();
    assert_eq!(list.len(), 6);
    assert!(list.segments().iter().all(|s| s.duration == 10 * CLOCK_FREQ));
    assert_eq!(list.segments()[5].uri, "segment5.ts");
    assert_eq!(list.segment_number_by_time(25 * CLOCK_FREQ), Some(2));
}

#[test]
fn master_with_audio_group() {
    let playlist = parse_fixture(include_str!("../fixtures/hls/master.m3u8"));
    assert!(playlist.is_master);
    assert_eq!(playlist.duration, 0);

    let sets = &playlist.periods[0].adaptation_sets;
    assert_eq!(sets.len(), 2);

    let variants = &sets[0].representations;
    assert_eq!(variants.len(), 2);
    assert!(variants.iter().all(|r| r.stream_type == StreamType::Video));
    assert!(variants.iter().all(|r| r.audio_group.as_deref() == Some("grp1")));
    assert_eq!(variants[1].bandwidth, 2_560_000);
    assert_eq!(variants[1].resolution, Some((1280, 720)));
    assert_eq!(
        variants[1].playlist_url.as_str(),
        "https://example.com/live/high/index.m3u8"
    );

    let audio = &sets[1].representations;
    assert_eq!(audio.len(), 1);
    assert_eq!(audio[0].stream_type, StreamType::Audio);
    assert_eq!(audio[0].language.as_deref(), Some("en"));
    assert_eq!(audio[0].description(), "grp1 Main");
}

#[test]
fn byte_ranges_continue_from_previous_segment() {
    let data = include_str!("../fixtures/hls/byterange.m3u8");
    let ranges = |playlist: Playlist| -> Vec<Option<ByteRange>> {
        playlist
            .into_first_representation()
            .and_then(|rep| rep.segment_list)
            .assert_success()
            .segments()
            .iter()
            .map(|s| s.byte_range)
            .collect()
    };

    let first = ranges(parse_fixture(data));
    assert_eq!(
        first,
        vec![
            Some(ByteRange::new(0, 999)),
            Some(ByteRange::new(2000, 2499)),
            Some(ByteRange::new(2500, 2799)),
        ]
    );
    assert_eq!(first, ranges(parse_fixture(data)));

    let rep = parse_fixture(data).into_first_representation().assert_success();
    let init = rep.segment_list.assert_success().segments()[0]
        .init_segment
        .clone()
        .assert_success();
    assert_eq!(init.uri, "init.mp4");
    assert_eq!(init.byte_range, Some(ByteRange::new(0, 719)));
}

#[test]
fn encryption_and_discontinuities() {
    let rep = parse_fixture(include_str!("../fixtures/hls/encrypted.m3u8"))
        .into_first_representation()
        .assert_success();
    assert_eq!(rep.media_sequence, 100);
    assert_eq!(rep.discontinuity_sequence, 2);

    let list = rep.segment_list.assert_success();
    let segments = list.segments();

    let keys: Vec<_> = segments
        .iter()
        .map(|s| {
            s.encryption
                .iter()
                .map(|e| e.key_url.clone())
                .collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(
        keys,
        vec![
            vec!["https://keys.example.com/first".to_string()],
            vec!["https://keys.example.com/second".to_string()],
            vec!["https://keys.example.com/second".to_string()],
            vec![String::new()],
        ]
    );
    assert_eq!(segments[0].encryption[0].method, EncryptionMethod::Aes128);
    assert_eq!(segments[0].encryption[0].iv_for(100)[15], 1);
    assert_eq!(segments[1].encryption[0].iv_for(101)[15], 101);
    assert!(!segments[3].is_encrypted());

    let discontinuities: Vec<_> = segments.iter().map(|s| s.discontinuity).collect();
    assert_eq!(discontinuities, vec![0, 0, 1, 2]);

    let utc: Vec<_> = segments.iter().map(|s| s.utc_time).collect();
    let base = 1_704_067_200 * CLOCK_FREQ;
    assert_eq!(
        utc,
        vec![
            Some(base),
            Some(base + 6 * CLOCK_FREQ),
            Some(base + 11_500_000),
            Some(base + 17_500_000),
        ]
    );
}

#[test]
fn low_latency_playlist() {
    let rep = parse_fixture(include_str!("../fixtures/hls/low_latency.m3u8"))
        .into_first_representation()
        .assert_success();
    assert!(rep.live);
    assert!(rep.is_low_latency());
    assert!(rep.server_control.can_block_reload);
    assert_eq!(rep.server_control.can_skip_until, 24.);
    assert_eq!(rep.part_target_duration, CLOCK_FREQ);
    assert_eq!(rep.rendition_reports.len(), 2);
    assert_eq!(rep.rendition_reports[1].last_part, Some(1));

    let hint = rep.preload_hint.clone().assert_success();
    assert!(hint.is_partial);
    assert_eq!(hint.uri, "filePart268.1.mp4");

    let list = rep.segment_list.assert_success();
    let segments = list.segments();
    assert_eq!(list.first_seq_num(), Some(266));
    assert_eq!(list.last_seq_num(), Some(268));
    assert_eq!(segments[1].parts.len(), 2);
    assert!(segments[1].parts[0].independent);

    let in_progress = &segments[2];
    assert!(in_progress.is_in_progress());
    assert_eq!(in_progress.parts[0].uri, "filePart268.0.mp4");
    assert_eq!(in_progress.duration, CLOCK_FREQ);
    assert!(std::sync::Arc::ptr_eq(
        segments[0].init_segment.as_ref().unwrap(),
        in_progress.init_segment.as_ref().unwrap()
    ));
}

#[test]
fn segment_timeline_has_no_gaps() {
    for data in FIXTURES {
        let playlist = parse_fixture(data);
        for rep in playlist.representations() {
            let Some(list) = &rep.segment_list else {
                continue;
            };
            let segments = list.segments();
            let total: i64 = segments.iter().map(|s| s.duration).sum();
            assert_eq!(segments.last().map(|s| s.end_time()), Some(total));

            for pair in segments.windows(2) {
                assert_eq!(pair[0].end_time(), pair[1].start_time);
                assert_eq!(pair[0].sequence + 1, pair[1].sequence);
            }
        }
    }
}

#[test]
fn skipped_segments_advance_sequence() {
    let rep = parse_fixture(
        "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:10
#EXT-X-SKIP:SKIPPED-SEGMENTS=5
#EXTINF:4.0,
a.ts
#EXTINF:4.0,
b.ts",
    )
    .into_first_representation()
    .assert_success();
    assert_eq!(rep.skipped_segments, 5);

    let list = rep.segment_list.assert_success();
    assert_eq!(list.first_seq_num(), Some(15));
    assert_eq!(list.last_seq_num(), Some(16));
}

#[test]
fn invalid_manifests() {
    let url: Url = "https://example.com/index.m3u8".parse().unwrap();
    assert!(matches!(
        parse_bytes(b"<html></html>", &url),
        Err(SenriError::InvalidManifest(_))
    ));
    assert!(parse_bytes(b"#EXTM3U\n", &url).ok().is_none());
}
