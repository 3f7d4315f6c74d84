//! Attribute values and attribute lists of playlist directives.
//!
//! Values are kept in their raw textual form and converted on access, so a
//! malformed value only affects the consumer asking for it.

use std::fmt;

/// Raw value of one attribute, possibly quoted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeValue(String);

/// `LENGTH[@OFFSET]` as written in the playlist.
///
/// A missing offset means the range starts right after the previous range of
/// the same kind. Resolving it is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRangeSpec {
    pub length: u64,
    pub offset: Option<u64>,
}

impl ByteRangeSpec {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (length, offset) = match s.split_once('@') {
            Some((length, offset)) => (length, Some(offset)),
            None => (s, None),
        };

        let length = parse_decimal(length)?;
        let offset = match offset {
            Some(offset) => Some(parse_decimal(offset)?),
            None => None,
        };
        Some(Self { length, offset })
    }
}

fn parse_decimal(s: &str) -> Option<u64> {
    let s = s.trim();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}

impl AttributeValue {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The value exactly as written, quotes included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value with one pair of surrounding double quotes removed.
    pub fn quoted_string(&self) -> &str {
        let s = self.0.as_str();
        if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
            &s[1..s.len() - 1]
        } else {
            s
        }
    }

    /// Leading decimal digits of the value, `10` for `10.0`.
    pub fn decimal(&self) -> Option<u64> {
        parse_decimal(self.quoted_string())
    }

    pub fn floating_point(&self) -> Option<f64> {
        self.quoted_string()
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    /// Hexadecimal sequence with or without the `0x` prefix.
    pub fn hex_sequence(&self) -> Option<Vec<u8>> {
        let s = self.quoted_string().trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() {
            return None;
        }

        if digits.len() % 2 == 1 {
            hex::decode(format!("0{digits}")).ok()
        } else {
            hex::decode(digits).ok()
        }
    }

    pub fn byte_range(&self) -> Option<ByteRangeSpec> {
        ByteRangeSpec::parse(self.quoted_string())
    }

    /// `WIDTHxHEIGHT`
    pub fn resolution(&self) -> Option<(u32, u32)> {
        let (width, height) = self
            .quoted_string()
            .split_once(|c: char| c == 'x' || c == 'X')?;
        Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
    }

    pub fn is_yes(&self) -> bool {
        self.quoted_string() == "YES"
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

/// Ordered `NAME=VALUE` pairs of one directive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Splits an attribute list on top-level commas. Commas inside quoted
    /// strings do not split, and pairs without a name are dropped.
    pub fn parse(body: &str) -> Self {
        let mut attributes = Self::new();
        let mut in_quotes = false;
        let mut start = 0;

        for (i, c) in body.char_indices() {
            match c {
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => {
                    attributes.push_pair(&body[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        attributes.push_pair(&body[start..]);

        attributes
    }

    fn push_pair(&mut self, pair: &str) {
        let pair = pair.trim();
        if pair.is_empty() {
            return;
        }

        match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                self.insert(name.trim(), AttributeValue::new(value.trim()));
            }
            _ => log::debug!("Dropped malformed attribute: {pair}"),
        }
    }

    /// Appends an attribute. An existing attribute with the same name keeps
    /// its position and takes the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: AttributeValue) {
        let name = name.into();
        match self.0.iter_mut().find(|a| a.name == name) {
            Some(attribute) => attribute.value = value,
            None => self.0.push(Attribute { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
