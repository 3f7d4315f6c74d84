//! Typed representation of one playlist line.

use super::attribute::{AttributeValue, Attributes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingleValueKind {
    /// A bare, non-`#` line
    Uri,
    Version,
    ByteRange,
    ProgramDateTime,
    TargetDuration,
    MediaSequence,
    DiscontinuitySequence,
    PlaylistType,
    EndList,
    Discontinuity,
    IFramesOnly,
    IndependentSegments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeListKind {
    StreamInf,
    Media,
    Key,
    Map,
    Part,
    PartInf,
    ServerControl,
    PreloadHint,
    Skip,
    RenditionReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValuesListKind {
    Inf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    SingleValue {
        kind: SingleValueKind,
        value: AttributeValue,
    },
    AttributeList {
        kind: AttributeListKind,
        attributes: Attributes,
    },
    ValuesList {
        kind: ValuesListKind,
        attributes: Attributes,
    },
}

impl SingleValueKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "" => Self::Uri,
            "EXT-X-VERSION" => Self::Version,
            "EXT-X-BYTERANGE" => Self::ByteRange,
            "EXT-X-PROGRAM-DATE-TIME" => Self::ProgramDateTime,
            "EXT-X-TARGETDURATION" => Self::TargetDuration,
            "EXT-X-MEDIA-SEQUENCE" => Self::MediaSequence,
            "EXT-X-DISCONTINUITY-SEQUENCE" => Self::DiscontinuitySequence,
            "EXT-X-PLAYLIST-TYPE" => Self::PlaylistType,
            "EXT-X-ENDLIST" => Self::EndList,
            "EXT-X-DISCONTINUITY" => Self::Discontinuity,
            "EXT-X-I-FRAMES-ONLY" => Self::IFramesOnly,
            "EXT-X-INDEPENDENT-SEGMENTS" => Self::IndependentSegments,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uri => "",
            Self::Version => "EXT-X-VERSION",
            Self::ByteRange => "EXT-X-BYTERANGE",
            Self::ProgramDateTime => "EXT-X-PROGRAM-DATE-TIME",
            Self::TargetDuration => "EXT-X-TARGETDURATION",
            Self::MediaSequence => "EXT-X-MEDIA-SEQUENCE",
            Self::DiscontinuitySequence => "EXT-X-DISCONTINUITY-SEQUENCE",
            Self::PlaylistType => "EXT-X-PLAYLIST-TYPE",
            Self::EndList => "EXT-X-ENDLIST",
            Self::Discontinuity => "EXT-X-DISCONTINUITY",
            Self::IFramesOnly => "EXT-X-I-FRAMES-ONLY",
            Self::IndependentSegments => "EXT-X-INDEPENDENT-SEGMENTS",
        }
    }

    fn accepts(&self, value: &AttributeValue) -> bool {
        match self {
            Self::Version
            | Self::TargetDuration
            | Self::MediaSequence
            | Self::DiscontinuitySequence => value.decimal().is_some(),
            Self::ByteRange => value.byte_range().is_some(),
            Self::ProgramDateTime | Self::PlaylistType => !value.is_empty(),
            Self::Uri
            | Self::EndList
            | Self::Discontinuity
            | Self::IFramesOnly
            | Self::IndependentSegments => true,
        }
    }
}

impl AttributeListKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "EXT-X-STREAM-INF" => Self::StreamInf,
            "EXT-X-MEDIA" => Self::Media,
            "EXT-X-KEY" => Self::Key,
            "EXT-X-MAP" => Self::Map,
            "EXT-X-PART" => Self::Part,
            "EXT-X-PART-INF" => Self::PartInf,
            "EXT-X-SERVER-CONTROL" => Self::ServerControl,
            "EXT-X-PRELOAD-HINT" => Self::PreloadHint,
            "EXT-X-SKIP" => Self::Skip,
            "EXT-X-RENDITION-REPORT" => Self::RenditionReport,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamInf => "EXT-X-STREAM-INF",
            Self::Media => "EXT-X-MEDIA",
            Self::Key => "EXT-X-KEY",
            Self::Map => "EXT-X-MAP",
            Self::Part => "EXT-X-PART",
            Self::PartInf => "EXT-X-PART-INF",
            Self::ServerControl => "EXT-X-SERVER-CONTROL",
            Self::PreloadHint => "EXT-X-PRELOAD-HINT",
            Self::Skip => "EXT-X-SKIP",
            Self::RenditionReport => "EXT-X-RENDITION-REPORT",
        }
    }

    fn mandatory(&self) -> &'static [&'static str] {
        match self {
            Self::Media => &["TYPE", "GROUP-ID"],
            Self::Key => &["METHOD"],
            Self::Map => &["URI"],
            Self::Part => &["URI", "DURATION"],
            Self::PartInf => &["PART-TARGET"],
            Self::PreloadHint => &["TYPE", "URI"],
            Self::Skip => &["SKIPPED-SEGMENTS"],
            Self::RenditionReport => &["URI"],
            Self::StreamInf | Self::ServerControl => &[],
        }
    }
}

impl ValuesListKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "EXTINF" => Some(Self::Inf),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Inf => "EXTINF",
        }
    }
}

impl Directive {
    /// Builds the directive called `name` from its raw body.
    ///
    /// Unknown names and directives missing a mandatory field yield `None`.
    pub fn create(name: &str, body: &str) -> Option<Self> {
        if let Some(kind) = SingleValueKind::from_name(name) {
            let value = AttributeValue::new(body.trim());
            if !kind.accepts(&value) {
                log::debug!("Dropped #{name} with invalid value: {body}");
                return None;
            }
            return Some(Self::SingleValue { kind, value });
        }

        if let Some(kind) = AttributeListKind::from_name(name) {
            let attributes = Attributes::parse(body);
            if let Some(missing) = kind.mandatory().iter().find(|a| !attributes.contains(a)) {
                log::debug!("Dropped #{name} without mandatory attribute {missing}");
                return None;
            }
            return Some(Self::AttributeList { kind, attributes });
        }

        if let Some(kind) = ValuesListKind::from_name(name) {
            return Self::values_list(kind, body);
        }

        log::debug!("Ignored unknown directive #{name}");
        None
    }

    /// A bare URI line.
    pub fn uri(line: &str) -> Self {
        Self::SingleValue {
            kind: SingleValueKind::Uri,
            value: AttributeValue::new(line.trim()),
        }
    }

    // EXTINF:<duration>,[<title>]
    fn values_list(kind: ValuesListKind, body: &str) -> Option<Self> {
        let (duration, title) = match body.split_once(',') {
            Some((duration, title)) => (duration, Some(title)),
            None => (body, None),
        };

        let duration = AttributeValue::new(duration.trim());
        if duration.floating_point().is_none() {
            log::debug!("Dropped #{} with invalid duration: {body}", kind.name());
            return None;
        }

        let mut attributes = Attributes::new();
        attributes.insert("DURATION", duration);
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            attributes.insert("TITLE", AttributeValue::new(title));
        }
        Some(Self::ValuesList { kind, attributes })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SingleValue { kind, .. } => kind.name(),
            Self::AttributeList { kind, .. } => kind.name(),
            Self::ValuesList { kind, .. } => kind.name(),
        }
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Self::AttributeList { attributes, .. } | Self::ValuesList { attributes, .. } => {
                Some(attributes)
            }
            Self::SingleValue { .. } => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes().and_then(|a| a.get(name))
    }

    pub fn is_attribute_list(&self, expected: AttributeListKind) -> bool {
        matches!(self, Self::AttributeList { kind, .. } if *kind == expected)
    }

    /// Adds `URI` to a stream-info directive, whose URI sits on the next line.
    pub(crate) fn merge_uri(&mut self, uri: &str) -> bool {
        match self {
            Self::AttributeList {
                kind: AttributeListKind::StreamInf,
                attributes,
            } => {
                attributes.insert("URI", AttributeValue::new(uri.trim()));
                true
            }
            _ => false,
        }
    }
}
