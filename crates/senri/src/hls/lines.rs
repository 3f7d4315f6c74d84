/// Line-oriented access to a playlist byte source.
pub trait LineReader {
    /// Next line without its terminator, or `None` once the source is drained.
    fn get_line(&mut self) -> Option<String>;

    fn is_eof(&self) -> bool;
}

/// Splits an in-memory buffer on `\n`, dropping a trailing `\r`.
pub struct ByteLines<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteLines<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        // UTF-8 BOM
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        Self { data, position: 0 }
    }
}

impl LineReader for ByteLines<'_> {
    fn get_line(&mut self) -> Option<String> {
        if self.is_eof() {
            return None;
        }

        let rest = &self.data[self.position..];
        let (line, consumed) = match rest.iter().position(|b| *b == b'\n') {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        self.position += consumed;

        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Some(String::from_utf8_lossy(line).into_owned())
    }

    fn is_eof(&self) -> bool {
        self.position >= self.data.len()
    }
}
