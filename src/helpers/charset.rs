use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Character sets understood when decoding multipart text fields and
/// encoding text response chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    /// Looks up a charset label such as `UTF-8` or `iso-8859-1`, ignoring case and quotes.
    pub fn from_label(label: &str) -> Option<Charset> {
        let label = label.trim().trim_matches('"').to_ascii_lowercase();
        match label.as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "l1" => Some(Charset::Latin1),
            "us-ascii" | "ascii" => Some(Charset::Ascii),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Ascii => "US-ASCII",
        }
    }

    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes),
            Charset::Latin1 => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
            Charset::Ascii => {
                if bytes.is_ascii() {
                    String::from_utf8_lossy(bytes)
                } else {
                    Cow::Owned(
                        bytes
                            .iter()
                            .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                            .collect(),
                    )
                }
            }
        }
    }

    /// Unrepresentable characters become `?`.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        let max = match self {
            Charset::Utf8 => return Cow::Borrowed(text.as_bytes()),
            Charset::Latin1 => 0xFF,
            Charset::Ascii => 0x7F,
        };
        if text.is_ascii() {
            return Cow::Borrowed(text.as_bytes());
        }
        Cow::Owned(
            text.chars()
                .map(|c| if (c as u32) <= max { c as u8 } else { b'?' })
                .collect(),
        )
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Charset::from_label(s).ok_or_else(|| format!("unsupported charset: {}", s))
    }
}
