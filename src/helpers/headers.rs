use std::fmt;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

/// Joins multiple logical values held under one header name.
/// Never valid inside a stored value, since `set`/`add` strip line terminators.
pub const VALUE_SEPARATOR: char = '\n';

/// Case-insensitive, case-preserving multi-value header collection.
///
/// Names are unique under ASCII case-insensitive comparison. The casing used by the
/// most recent `set`/`add` is the one reported by [`Headers::iter`]. Several values
/// for one name are stored joined with [`VALUE_SEPARATOR`]; the wire writer emits one
/// physical header line per value.
///
/// Any collection-like input is turned into `Headers` through `From`/`FromIterator`.
/// Converting a value that already is `Headers` goes through the reflexive `From`
/// impl and is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Returns the stored value, joined if the header holds several.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    /// Returns every logical value stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.get(name)
            .into_iter()
            .flat_map(|value| value.split(VALUE_SEPARATOR))
    }

    /// Replaces any value stored under any casing of `name`.
    pub fn set(&mut self, name: &str, value: impl AsRef<str>) {
        let value = strip_line_terminators(value.as_ref());
        match self.position(name) {
            Some(i) => self.entries[i] = (name.to_owned(), value),
            None => self.entries.push((name.to_owned(), value)),
        }
    }

    /// Appends a value, keeping the ones already stored under `name`.
    pub fn add(&mut self, name: &str, value: impl AsRef<str>) {
        let value = strip_line_terminators(value.as_ref());
        match self.position(name) {
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.1.push(VALUE_SEPARATOR);
                entry.1.push_str(&value);
                if entry.0 != name {
                    entry.0 = name.to_owned();
                }
            }
            None => self.entries.push((name.to_owned(), value)),
        }
    }

    /// Removes every value of `name`, whatever casing was used to store it.
    pub fn unset(&mut self, name: &str) {
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One `(name, value)` pair per logical value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, value)| {
            value
                .split(VALUE_SEPARATOR)
                .map(move |v| (name.as_str(), v))
        })
    }

    /// MIME-style rendering for diagnostics. Not the wire path.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.iter() {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, http::Error> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in self.iter() {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            let value = HeaderValue::from_str(value)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

fn strip_line_terminators(value: &str) -> String {
    value.replace(['\r', '\n'], "")
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = Headers::new();
        for (name, value) in map.iter() {
            headers.add(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        headers
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.add(name.as_ref(), value);
        }
        headers
    }
}

impl<K, V> From<Vec<(K, V)>> for Headers
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Headers
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}
