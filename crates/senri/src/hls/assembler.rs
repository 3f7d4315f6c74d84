//! Folds the directives of a media playlist into segments.

use std::sync::Arc;

use super::{
    attribute::{AttributeValue, ByteRangeSpec},
    directive::{AttributeListKind, Directive, SingleValueKind, ValuesListKind},
};
use crate::{
    model::{
        EncryptionMethod, InitSegment, PreloadHint, RenditionReport, Representation, Segment,
        SegmentEncryption, SegmentList, SegmentPart,
    },
    util::{
        range::ByteRange,
        time::{parse_program_date_time, secs_to_ticks},
    },
};

/// Builds the segment list of `representation` from its playlist directives.
///
/// Playlist-level attributes (target durations, live flag, server control,
/// rendition reports, preload hint) are written to `representation` as they
/// are met.
pub fn assemble(representation: &mut Representation, directives: &[Directive]) -> SegmentList {
    let mut assembler = Assembler::new(representation);
    for directive in directives {
        assembler.apply(directive);
    }
    assembler.finish()
}

struct Assembler<'a> {
    rep: &'a mut Representation,
    segments: Vec<Segment>,

    sequence: u64,
    start_time: i64,
    utc_time: Option<i64>,
    discontinuity: u64,

    pending_duration: Option<i64>,
    pending_byte_range: Option<ByteRangeSpec>,
    byte_range_offset: u64,
    part_range_offset: u64,

    encryption: Vec<SegmentEncryption>,
    clear_encryption: bool,
    init_segment: Option<Arc<InitSegment>>,
    parts: Vec<SegmentPart>,
}

impl<'a> Assembler<'a> {
    fn new(rep: &'a mut Representation) -> Self {
        rep.live = true;

        Self {
            rep,
            segments: Vec::new(),
            sequence: 0,
            start_time: 0,
            utc_time: None,
            discontinuity: 0,
            pending_duration: None,
            pending_byte_range: None,
            byte_range_offset: 0,
            part_range_offset: 0,
            encryption: Vec::new(),
            clear_encryption: true,
            init_segment: None,
            parts: Vec::new(),
        }
    }

    fn apply(&mut self, directive: &Directive) {
        match directive {
            Directive::SingleValue { kind, value } => self.apply_single_value(*kind, value),
            Directive::ValuesList {
                kind: ValuesListKind::Inf,
                attributes,
            } => {
                self.pending_duration = attributes
                    .get("DURATION")
                    .and_then(AttributeValue::floating_point)
                    .map(secs_to_ticks);
            }
            Directive::AttributeList { kind, .. } => self.apply_attribute_list(*kind, directive),
        }
    }

    fn apply_single_value(&mut self, kind: SingleValueKind, value: &AttributeValue) {
        match kind {
            SingleValueKind::Uri => {
                if value.is_empty() {
                    self.pending_duration = None;
                    self.pending_byte_range = None;
                } else {
                    self.emit(value.as_str().to_string());
                }
            }
            SingleValueKind::Version => self.rep.version = value.decimal(),
            SingleValueKind::MediaSequence => {
                self.sequence = value.decimal().unwrap_or_default();
                self.rep.media_sequence = self.sequence;
            }
            SingleValueKind::DiscontinuitySequence => {
                self.rep.discontinuity_sequence = value.decimal().unwrap_or_default();
            }
            SingleValueKind::TargetDuration => {
                self.rep.target_duration = secs_to_ticks(value.decimal().unwrap_or_default() as f64);
            }
            SingleValueKind::PlaylistType => self.rep.live = value.as_str() != "VOD",
            SingleValueKind::EndList => self.rep.live = false,
            SingleValueKind::ByteRange => self.pending_byte_range = value.byte_range(),
            SingleValueKind::ProgramDateTime => match parse_program_date_time(value.as_str()) {
                Some(time) => self.utc_time = Some(time),
                None => log::debug!("Ignored unparsable program date time: {value}"),
            },
            SingleValueKind::Discontinuity => {
                self.discontinuity = self.discontinuity.saturating_add(1)
            }
            SingleValueKind::IFramesOnly => self.rep.i_frames_only = true,
            SingleValueKind::IndependentSegments => self.rep.independent_segments = true,
        }
    }

    fn apply_attribute_list(&mut self, kind: AttributeListKind, directive: &Directive) {
        let attr = |name: &str| directive.attribute(name);

        match kind {
            AttributeListKind::Key => {
                if self.clear_encryption {
                    self.encryption.clear();
                    self.clear_encryption = false;
                }
                self.encryption.push(parse_key(directive));
            }
            AttributeListKind::Map => {
                let Some(uri) = attr("URI") else { return };
                let byte_range = attr("BYTERANGE")
                    .and_then(AttributeValue::byte_range)
                    .and_then(|spec| {
                        ByteRange::with_length(spec.offset.unwrap_or_default(), spec.length)
                    });
                self.init_segment = Some(Arc::new(InitSegment {
                    uri: uri.quoted_string().to_string(),
                    byte_range,
                }));
            }
            AttributeListKind::Part => {
                let duration = attr("DURATION")
                    .and_then(AttributeValue::floating_point)
                    .map(secs_to_ticks)
                    .unwrap_or_default();
                if duration > self.rep.part_target_duration {
                    self.rep.part_target_duration = duration;
                }

                let byte_range = attr("BYTERANGE")
                    .and_then(AttributeValue::byte_range)
                    .and_then(|spec| {
                        let start = spec.offset.unwrap_or(self.part_range_offset);
                        let range = ByteRange::with_length(start, spec.length)?;
                        self.part_range_offset = range.next_offset();
                        Some(range)
                    });

                self.parts.push(SegmentPart {
                    sequence: self.parts.len(),
                    duration,
                    uri: attr("URI")
                        .map(|v| v.quoted_string().to_string())
                        .unwrap_or_default(),
                    byte_range,
                    independent: attr("INDEPENDENT").is_some_and(AttributeValue::is_yes),
                });
            }
            AttributeListKind::PartInf => {
                if let Some(target) = attr("PART-TARGET").and_then(AttributeValue::floating_point) {
                    self.rep.part_target_duration = secs_to_ticks(target);
                }
            }
            AttributeListKind::ServerControl => {
                let control = &mut self.rep.server_control;
                if let Some(v) = attr("CAN-BLOCK-RELOAD") {
                    control.can_block_reload = v.is_yes();
                }
                if let Some(v) = attr("CAN-SKIP-UNTIL").and_then(AttributeValue::floating_point) {
                    control.can_skip_until = v;
                }
                if let Some(v) = attr("HOLD-BACK").and_then(AttributeValue::floating_point) {
                    control.hold_back = v;
                }
                if let Some(v) = attr("PART-HOLD-BACK").and_then(AttributeValue::floating_point) {
                    control.part_hold_back = v;
                }
            }
            AttributeListKind::PreloadHint => {
                // the first partial hint is the one to fetch next
                if self.rep.preload_hint.as_ref().is_some_and(|h| h.is_partial) {
                    return;
                }
                let start = attr("BYTERANGE-START")
                    .and_then(AttributeValue::decimal)
                    .unwrap_or_default();
                self.rep.preload_hint = Some(PreloadHint {
                    is_partial: attr("TYPE").is_some_and(|t| t.as_str() == "PART"),
                    uri: attr("URI")
                        .map(|v| v.quoted_string().to_string())
                        .unwrap_or_default(),
                    byte_range: attr("BYTERANGE-LENGTH")
                        .and_then(AttributeValue::decimal)
                        .and_then(|length| ByteRange::with_length(start, length)),
                });
            }
            AttributeListKind::Skip => {
                let skipped = attr("SKIPPED-SEGMENTS")
                    .and_then(AttributeValue::decimal)
                    .unwrap_or_default();
                self.sequence = self.sequence.saturating_add(skipped);
                self.rep.skipped_segments = self.rep.skipped_segments.saturating_add(skipped);
            }
            AttributeListKind::RenditionReport => {
                self.rep.rendition_reports.push(RenditionReport {
                    uri: attr("URI")
                        .map(|v| v.quoted_string().to_string())
                        .unwrap_or_default(),
                    last_msn: attr("LAST-MSN").and_then(AttributeValue::decimal),
                    last_part: attr("LAST-PART").and_then(AttributeValue::decimal),
                });
            }
            AttributeListKind::StreamInf | AttributeListKind::Media => {}
        }
    }

    fn take_byte_range(&mut self) -> Option<ByteRange> {
        let spec = self.pending_byte_range.take()?;
        let start = spec.offset.unwrap_or(self.byte_range_offset);
        let Some(range) = ByteRange::with_length(start, spec.length) else {
            log::debug!("Dropped byte range of {} bytes at {start}", spec.length);
            return None;
        };
        self.byte_range_offset = range.next_offset();
        Some(range)
    }

    fn take_encryption(&mut self) -> Vec<SegmentEncryption> {
        if !self.encryption.is_empty() {
            self.clear_encryption = true;
        }
        self.encryption.clone()
    }

    fn push_segment(&mut self, sequence: u64, uri: String, duration: i64, parts: Vec<SegmentPart>) {
        let byte_range = self.take_byte_range();
        let encryption = self.take_encryption();

        self.segments.push(Segment {
            sequence,
            start_time: self.start_time,
            duration,
            utc_time: self.utc_time,
            uri,
            byte_range,
            discontinuity: self.discontinuity,
            init_segment: self.init_segment.clone(),
            parts,
            encryption,
        });

        self.start_time = self.start_time.saturating_add(duration);
        self.utc_time = self.utc_time.map(|time| time.saturating_add(duration));
    }

    fn emit(&mut self, uri: String) {
        let duration = self
            .pending_duration
            .take()
            .unwrap_or(self.rep.target_duration);
        let parts = std::mem::take(&mut self.parts);
        self.part_range_offset = 0;

        // u64::MAX stays unassigned
        let sequence = self.sequence;
        let Some(next) = sequence.checked_add(1) else {
            log::debug!("Dropped segment {uri}: media sequence exhausted");
            self.pending_byte_range = None;
            return;
        };
        self.sequence = next;
        self.push_segment(sequence, uri, duration, parts);
    }

    fn finish(mut self) -> SegmentList {
        if !self.parts.is_empty() && self.sequence < u64::MAX {
            let parts = std::mem::take(&mut self.parts);
            let duration = parts
                .iter()
                .fold(0i64, |acc, p| acc.saturating_add(p.duration));
            self.push_segment(self.sequence, String::new(), duration, parts);
        }

        SegmentList::new(self.segments)
    }
}

fn parse_key(directive: &Directive) -> SegmentEncryption {
    let attr = |name: &str| directive.attribute(name);
    let quoted = |name: &str| attr(name).map(|v| v.quoted_string().to_string());
    let iv = attr("IV")
        .and_then(AttributeValue::hex_sequence)
        .and_then(|bytes| to_iv(&bytes));

    let method = attr("METHOD").map(AttributeValue::as_str).unwrap_or_default();
    match (method, quoted("URI")) {
        ("AES-128", Some(key_url)) => SegmentEncryption {
            method: EncryptionMethod::Aes128,
            key_url,
            iv,
            iv_static: iv.is_some(),
            key_format: String::new(),
        },
        ("SAMPLE-AES", Some(key_url)) => SegmentEncryption {
            method: EncryptionMethod::AesSample,
            key_url,
            iv,
            iv_static: iv.is_some(),
            key_format: quoted("KEYFORMAT").unwrap_or_default(),
        },
        ("AES-PRIVATE", _) if attr("DATE").is_some() => SegmentEncryption {
            method: EncryptionMethod::AesPrivate,
            key_url: quoted("DATE").unwrap_or_default(),
            iv,
            iv_static: false,
            key_format: String::new(),
        },
        _ => SegmentEncryption::default(),
    }
}

// Shorter sequences are left padded with zeros.
fn to_iv(bytes: &[u8]) -> Option<[u8; 16]> {
    if bytes.len() > 16 {
        return None;
    }
    let mut iv = [0u8; 16];
    iv[16 - bytes.len()..].copy_from_slice(bytes);
    Some(iv)
}
