use std::collections::BTreeMap;

use url::Url;

use super::{
    assembler::assemble,
    directive::{AttributeListKind, Directive},
    lines::{ByteLines, LineReader},
};
use crate::{
    error::{SenriError, SenriResult},
    model::{AdaptationSet, Period, Playlist, Representation, StreamType},
};

const HEADER: &str = "#EXTM3U";

const VIDEO_CODECS: [&str; 5] = ["avc", "hvc", "hev", "av01", "vp09"];
const AUDIO_CODECS: [&str; 4] = ["mp4a", "ac-3", "ec-3", "opus"];

pub fn parse_bytes(data: &[u8], playlist_url: &Url) -> SenriResult<Playlist> {
    parse(&mut ByteLines::new(data), playlist_url)
}

/// Parses a master or media playlist read from `reader`.
///
/// Fails only on structural problems: a missing `#EXTM3U` header or a
/// playlist without any recognised directive.
pub fn parse(reader: &mut impl LineReader, playlist_url: &Url) -> SenriResult<Playlist> {
    let header = reader.get_line().unwrap_or_default();
    let valid_header = header
        .strip_prefix(HEADER)
        .is_some_and(|rest| rest.chars().next().map_or(true, char::is_whitespace));
    if !valid_header {
        log::error!("Can not detect a HLS playlist at {playlist_url}");
        return Err(SenriError::InvalidManifest(format!(
            "missing {HEADER} header in {playlist_url}"
        )));
    }

    let directives = parse_entries(reader);
    if directives.is_empty() {
        return Err(SenriError::EmptyPlaylist);
    }

    let is_master = directives
        .iter()
        .any(|d| d.is_attribute_list(AttributeListKind::StreamInf));

    let (adaptation_sets, duration) = if is_master {
        log::debug!("Master playlist detected: {playlist_url}");
        (parse_master(&directives, playlist_url), 0)
    } else {
        let mut rep = Representation::new(playlist_url.clone());
        let segment_list = assemble(&mut rep, &directives);
        let duration = if rep.live {
            0
        } else {
            segment_list.total_duration()
        };
        rep.segment_list = Some(segment_list);
        rep.stream_type = StreamType::Mixed;

        (
            vec![AdaptationSet {
                representations: vec![rep],
            }],
            duration,
        )
    };

    Ok(Playlist {
        url: playlist_url.clone(),
        is_master,
        duration,
        periods: vec![Period { adaptation_sets }],
    })
}

/// Reads every line after the header into directives.
pub(crate) fn parse_entries(reader: &mut impl LineReader) -> Vec<Directive> {
    let mut entries: Vec<Directive> = Vec::new();
    let mut last: Option<usize> = None;

    while let Some(line) = reader.get_line() {
        if let Some(tag) = line.strip_prefix('#') {
            // other `#` lines are comments
            if tag.starts_with("EXT") {
                let (name, body) = tag.split_once(':').unwrap_or((tag, ""));
                last = Directive::create(name.trim(), body).map(|directive| {
                    entries.push(directive);
                    entries.len() - 1
                });
            }
        } else if !line.trim().is_empty() {
            // the URI of a variant stream follows its EXT-X-STREAM-INF
            let merged = last
                .and_then(|i| entries.get_mut(i))
                .is_some_and(|d| d.merge_uri(&line));
            if !merged {
                entries.push(Directive::uri(&line));
            }
            last = None;
        } else {
            last = None;
        }
    }

    entries
}

fn parse_master(directives: &[Directive], playlist_url: &Url) -> Vec<AdaptationSet> {
    let mut groups: BTreeMap<String, &Directive> = BTreeMap::new();
    let mut dummies: Vec<&Directive> = Vec::new();
    for media in directives
        .iter()
        .filter(|d| d.is_attribute_list(AttributeListKind::Media))
    {
        match media.attribute("URI") {
            Some(uri) => {
                groups.entry(uri.quoted_string().to_string()).or_insert(media);
            }
            None => dummies.push(media),
        }
    }

    let mut default_set = AdaptationSet::default();
    for info in directives
        .iter()
        .filter(|d| d.is_attribute_list(AttributeListKind::StreamInf))
    {
        let Some(uri) = info.attribute("URI") else {
            log::debug!("Dropped EXT-X-STREAM-INF without URI");
            continue;
        };
        if groups.contains_key(uri.as_str()) {
            continue;
        }

        let Some(mut rep) = create_representation(info, uri.as_str(), playlist_url) else {
            continue;
        };
        if rep.stream_type != StreamType::Mixed {
            promote_stream_type(&mut rep, info, &dummies);
        }
        default_set.representations.push(rep);
    }

    let mut sets = vec![default_set];
    for (uri, media) in groups {
        let Some(mut rep) = create_representation(media, &uri, playlist_url) else {
            continue;
        };

        rep.stream_type = match media.attribute("TYPE").map(|t| t.as_str()) {
            Some("AUDIO") => StreamType::Audio,
            Some("VIDEO") => StreamType::Video,
            Some("SUBTITLES") => StreamType::Subtitle,
            _ => StreamType::Mixed,
        };
        rep.language = media
            .attribute("LANGUAGE")
            .and_then(|l| normalize_language(l.quoted_string()));
        rep.group_id = media
            .attribute("GROUP-ID")
            .map(|g| g.quoted_string().to_string());
        rep.name = media.attribute("NAME").map(|n| n.quoted_string().to_string());

        sets.push(AdaptationSet {
            representations: vec![rep],
        });
    }

    sets.retain(|set| !set.representations.is_empty());
    sets
}

fn create_representation(
    directive: &Directive,
    uri: &str,
    playlist_url: &Url,
) -> Option<Representation> {
    let url = match playlist_url.join(uri) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Ignored rendition with invalid URI {uri}: {e}");
            return None;
        }
    };

    let attr = |name: &str| directive.attribute(name);
    let mut rep = Representation::new(url);
    rep.bandwidth = attr("BANDWIDTH")
        .and_then(|b| b.decimal())
        .unwrap_or_default();
    rep.resolution = attr("RESOLUTION")
        .and_then(|r| r.resolution())
        .filter(|(width, height)| *width > 0 && *height > 0);
    rep.audio_group = attr("AUDIO").map(|g| g.quoted_string().to_string());
    rep.video_group = attr("VIDEO").map(|g| g.quoted_string().to_string());

    if let Some(codecs) = attr("CODECS").map(|c| c.quoted_string().to_string()) {
        let video = rep.video_group.is_none() && VIDEO_CODECS.iter().any(|c| codecs.contains(c));
        let audio = rep.audio_group.is_none() && AUDIO_CODECS.iter().any(|c| codecs.contains(c));
        rep.stream_type = match (video, audio) {
            (true, true) => StreamType::Mixed,
            (true, false) => StreamType::Video,
            (false, true) => StreamType::Audio,
            (false, false) => StreamType::Unknown,
        };
        rep.codecs = Some(codecs);
    }

    Some(rep)
}

/// Uses URI-less `EXT-X-MEDIA` entries of the variant's groups to refine its type.
fn promote_stream_type(rep: &mut Representation, info: &Directive, dummies: &[&Directive]) {
    let video = info.attribute("VIDEO");
    let audio = info.attribute("AUDIO");

    for dummy in dummies {
        let Some(group) = dummy.attribute("GROUP-ID").filter(|g| !g.is_empty()) else {
            continue;
        };

        let video_match = video == Some(group) && rep.stream_type != StreamType::Video;
        let audio_match = audio == Some(group) && rep.stream_type != StreamType::Audio;
        if video_match || audio_match {
            rep.stream_type = match rep.stream_type {
                StreamType::Unknown if audio.is_some() => StreamType::Audio,
                StreamType::Unknown => StreamType::Video,
                _ => StreamType::Mixed,
            };
            break;
        }
    }
}

/// `en-US` -> `en`, `jpn` -> `jpn`. Longer tags without a short primary
/// sub-tag stay unset.
fn normalize_language(tag: &str) -> Option<String> {
    let tag = tag.trim();
    let language = match tag.split_once('-') {
        Some((primary, _)) if !primary.is_empty() && primary.len() <= 3 => primary,
        _ if tag.len() <= 3 => tag,
        _ => return None,
    };
    (!language.is_empty()).then(|| language.to_string())
}
