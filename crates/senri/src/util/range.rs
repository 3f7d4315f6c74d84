/// An inclusive byte range inside a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    /// Last byte of the range, inclusive.
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Builds a range from `length` bytes starting at `start`.
    ///
    /// Empty ranges are rejected, and so are ranges whose following offset
    /// does not fit in a `u64`.
    pub fn with_length(start: u64, length: u64) -> Option<Self> {
        if length == 0 {
            return None;
        }
        let next = start.checked_add(length)?;
        Some(Self {
            start,
            end: next - 1,
        })
    }

    /// First byte after this range.
    pub fn next_offset(&self) -> u64 {
        self.end.saturating_add(1)
    }

    pub fn to_http_range(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}
