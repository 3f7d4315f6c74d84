use serde::Serialize;
use url::Url;

use super::segment::{PreloadHint, RenditionReport, SegmentList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    #[default]
    Unknown,
    Video,
    Audio,
    Subtitle,
    Mixed,
}

/// Low-latency capabilities advertised by `EXT-X-SERVER-CONTROL`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ServerControl {
    pub can_block_reload: bool,
    /// Seconds. Zero when delta updates are not supported.
    pub can_skip_until: f64,
    pub hold_back: f64,
    pub part_hold_back: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub bandwidth: u64,
    pub language: Option<String>,
}

/// One encoded variant or alternate rendition.
#[derive(Debug, Clone)]
pub struct Representation {
    /// Absolute URL of this representation's media playlist
    pub playlist_url: Url,
    /// Directory of `playlist_url`, used to resolve segment URIs
    pub base_url: Url,

    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    pub codecs: Option<String>,
    pub stream_type: StreamType,
    pub language: Option<String>,
    pub group_id: Option<String>,
    pub name: Option<String>,
    pub audio_group: Option<String>,
    pub video_group: Option<String>,

    pub live: bool,
    /// Ticks
    pub target_duration: i64,
    /// Ticks
    pub part_target_duration: i64,
    pub server_control: ServerControl,
    pub rendition_reports: Vec<RenditionReport>,
    pub preload_hint: Option<PreloadHint>,

    pub version: Option<u64>,
    pub media_sequence: u64,
    pub discontinuity_sequence: u64,
    pub i_frames_only: bool,
    pub independent_segments: bool,
    /// `SKIPPED-SEGMENTS` of a delta playlist
    pub skipped_segments: u64,

    pub segment_list: Option<SegmentList>,
}

impl Representation {
    pub fn new(playlist_url: Url) -> Self {
        let base_url = playlist_url
            .join(".")
            .unwrap_or_else(|_| playlist_url.clone());

        Self {
            playlist_url,
            base_url,
            bandwidth: 0,
            resolution: None,
            codecs: None,
            stream_type: StreamType::Unknown,
            language: None,
            group_id: None,
            name: None,
            audio_group: None,
            video_group: None,
            live: true,
            target_duration: 0,
            part_target_duration: 0,
            server_control: ServerControl::default(),
            rendition_reports: Vec::new(),
            preload_hint: None,
            version: None,
            media_sequence: 0,
            discontinuity_sequence: 0,
            i_frames_only: false,
            independent_segments: false,
            skipped_segments: 0,
            segment_list: None,
        }
    }

    pub fn stream_info(&self) -> StreamInfo {
        let (width, height) = self.resolution.unwrap_or_default();
        StreamInfo {
            width,
            height,
            bandwidth: self.bandwidth,
            language: self.language.clone(),
        }
    }

    /// `GROUP-ID NAME` of an alternate rendition.
    pub fn description(&self) -> String {
        [self.group_id.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether the server publishes partial segments.
    pub fn is_low_latency(&self) -> bool {
        self.part_target_duration > 0
    }

    /// Resolves a segment or key URI against this representation.
    pub fn resolve(&self, uri: &str) -> Result<Url, url::ParseError> {
        self.playlist_url.join(uri)
    }

    /// Copies the variant-level attributes of a master playlist entry onto a
    /// freshly parsed media playlist.
    pub fn inherit_master_attributes(&mut self, master: &Representation) {
        self.bandwidth = master.bandwidth;
        self.resolution = master.resolution;
        self.codecs = master.codecs.clone();
        self.stream_type = master.stream_type;
        self.language = master.language.clone();
        self.group_id = master.group_id.clone();
        self.name = master.name.clone();
        self.audio_group = master.audio_group.clone();
        self.video_group = master.video_group.clone();
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdaptationSet {
    pub representations: Vec<Representation>,
}

impl AdaptationSet {
    pub fn description(&self) -> Option<String> {
        self.representations
            .first()
            .map(Representation::description)
            .filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Period {
    pub adaptation_sets: Vec<AdaptationSet>,
}

#[derive(Debug, Clone)]
pub struct Playlist {
    pub url: Url,
    pub is_master: bool,
    /// Ticks. Zero for live playlists.
    pub duration: i64,
    pub periods: Vec<Period>,
}

impl Playlist {
    pub fn representations(&self) -> impl Iterator<Item = &Representation> {
        self.periods
            .iter()
            .flat_map(|p| p.adaptation_sets.iter())
            .flat_map(|a| a.representations.iter())
    }

    pub fn into_first_representation(self) -> Option<Representation> {
        self.periods
            .into_iter()
            .flat_map(|p| p.adaptation_sets)
            .flat_map(|a| a.representations)
            .next()
    }
}
