use std::sync::Arc;

use serde::Serialize;

use crate::{
    error::{SenriError, SenriResult},
    util::range::ByteRange,
};

/// Media initialization section declared by `EXT-X-MAP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSegment {
    pub uri: String,
    pub byte_range: Option<ByteRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EncryptionMethod {
    #[default]
    None,
    Aes128,
    AesSample,
    AesPrivate,
}

/// One `EXT-X-KEY` in effect for a segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentEncryption {
    pub method: EncryptionMethod,
    pub key_url: String,
    /// Explicit IV. When absent the IV is derived from the sequence number.
    pub iv: Option<[u8; 16]>,
    pub iv_static: bool,
    pub key_format: String,
}

impl SegmentEncryption {
    /// IV to use for the segment numbered `sequence`.
    pub fn iv_for(&self, sequence: u64) -> [u8; 16] {
        self.iv
            .unwrap_or_else(|| (sequence as u128).to_be_bytes())
    }
}

/// Low-latency partial segment published by `EXT-X-PART`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPart {
    /// Index of the part inside its parent segment
    pub sequence: usize,
    pub duration: i64,
    pub uri: String,
    pub byte_range: Option<ByteRange>,
    pub independent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub sequence: u64,
    /// Ticks since the first segment of the playlist window.
    pub start_time: i64,
    pub duration: i64,
    /// Wall-clock time in microseconds since the UNIX epoch, only known when the
    /// playlist carries `EXT-X-PROGRAM-DATE-TIME`.
    pub utc_time: Option<i64>,
    /// Relative or absolute URI as written. Empty for a segment still being published.
    pub uri: String,
    pub byte_range: Option<ByteRange>,
    pub discontinuity: u64,
    pub init_segment: Option<Arc<InitSegment>>,
    pub parts: Vec<SegmentPart>,
    pub encryption: Vec<SegmentEncryption>,
}

impl Segment {
    /// Whether only the parts of this segment have been published so far.
    pub fn is_in_progress(&self) -> bool {
        self.uri.is_empty()
    }

    pub fn end_time(&self) -> i64 {
        self.start_time.saturating_add(self.duration)
    }

    /// The parts from index `from` on, as a segment delivered through its parts
    /// alone. Timing starts at the first remaining part.
    pub fn remaining_parts(&self, from: usize) -> Segment {
        let consumed = self.parts.get(..from).unwrap_or(&self.parts);
        let skipped = consumed
            .iter()
            .fold(0i64, |acc, p| acc.saturating_add(p.duration));
        let parts = self.parts.get(from..).unwrap_or_default().to_vec();

        Segment {
            start_time: self.start_time.saturating_add(skipped),
            duration: parts
                .iter()
                .fold(0i64, |acc, p| acc.saturating_add(p.duration)),
            utc_time: self.utc_time.map(|time| time.saturating_add(skipped)),
            uri: String::new(),
            byte_range: None,
            parts,
            ..self.clone()
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption
            .iter()
            .any(|e| e.method != EncryptionMethod::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreloadHint {
    pub is_partial: bool,
    pub uri: String,
    pub byte_range: Option<ByteRange>,
}

/// State of a sibling rendition as reported by `EXT-X-RENDITION-REPORT`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RenditionReport {
    pub uri: String,
    pub last_msn: Option<u64>,
    pub last_part: Option<u64>,
}

/// Diagnostic view of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentListEntry {
    pub sequence: u64,
    pub duration: i64,
    pub uri: String,
}

/// Segments of one representation, ordered by strictly increasing sequence number.
#[derive(Debug, Clone, Default)]
pub struct SegmentList {
    segments: Vec<Arc<Segment>>,
}

impl SegmentList {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments: segments.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first_seq_num(&self) -> Option<u64> {
        self.segments.first().map(|s| s.sequence)
    }

    pub fn last_seq_num(&self) -> Option<u64> {
        self.segments.last().map(|s| s.sequence)
    }

    pub fn get(&self, sequence: u64) -> Option<Arc<Segment>> {
        self.segments
            .binary_search_by_key(&sequence, |s| s.sequence)
            .ok()
            .map(|i| self.segments[i].clone())
    }

    /// First segment whose sequence number is not below `sequence`.
    pub fn first_at_or_after(&self, sequence: u64) -> Option<Arc<Segment>> {
        let index = self.segments.partition_point(|s| s.sequence < sequence);
        self.segments.get(index).cloned()
    }

    /// Number of segments from `sequence` (inclusive) to the end of the list.
    pub fn remaining_from(&self, sequence: u64) -> usize {
        let index = self.segments.partition_point(|s| s.sequence < sequence);
        self.segments.len() - index
    }

    /// Sequence number of the segment covering `time`. Times past the end map
    /// to the last segment.
    pub fn segment_number_by_time(&self, time: i64) -> Option<u64> {
        if time < 0 {
            return None;
        }
        self.segments
            .iter()
            .find(|s| time < s.end_time())
            .or_else(|| self.segments.last())
            .map(|s| s.sequence)
    }

    pub fn total_duration(&self) -> i64 {
        self.segments
            .iter()
            .fold(0i64, |acc, s| acc.saturating_add(s.duration))
    }

    pub fn entries(&self) -> Vec<SegmentListEntry> {
        self.segments
            .iter()
            .map(|s| SegmentListEntry {
                sequence: s.sequence,
                duration: s.duration,
                uri: s.uri.clone(),
            })
            .collect()
    }

    /// Fills the `skipped` segments a delta playlist omitted before `self` with
    /// the matching segments of `previous`.
    ///
    /// Start times are rebuilt from the first segment of the merged window.
    pub fn merge_skipped(&self, previous: &SegmentList, skipped: u64) -> SenriResult<SegmentList> {
        let Some(first) = self.first_seq_num() else {
            return Ok(self.clone());
        };
        let skip_start = first.saturating_sub(skipped);

        let mut segments: Vec<Arc<Segment>> = previous
            .segments
            .iter()
            .filter(|s| s.sequence >= skip_start && s.sequence < first)
            .cloned()
            .collect();
        let found = segments.len() as u64;
        if found < skipped {
            return Err(SenriError::SkipMergeFailed {
                missing: skipped - found,
            });
        }
        segments.extend(self.segments.iter().cloned());

        let mut start_time = 0;
        let segments = segments
            .into_iter()
            .map(|segment| {
                let segment = if segment.start_time == start_time {
                    segment
                } else {
                    Arc::new(Segment {
                        start_time,
                        ..(*segment).clone()
                    })
                };
                start_time = start_time.saturating_add(segment.duration);
                segment
            })
            .collect();

        Ok(SegmentList { segments })
    }
}
