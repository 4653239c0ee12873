use std::collections::hash_map::Entry;
use std::collections::HashMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

/// Characters left as is by `url_encode`, the same set `encodeURIComponent` keeps.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Request parameters collected from the query string and the request body.
pub type Params = HashMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    File(FileUpload),
    /// Values of a name that arrived more than once, in arrival order.
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileUpload> {
        match self {
            ParamValue::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(values) => Some(values),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(text: &str) -> Self {
        ParamValue::Text(text.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(text: String) -> Self {
        ParamValue::Text(text)
    }
}

/// First occurrence stores the value as is, the second turns it into a list
/// of both, later ones are appended.
pub fn merge_parameter(params: &mut Params, name: &str, value: ParamValue) {
    match params.entry(name.to_owned()) {
        Entry::Vacant(entry) => {
            entry.insert(value);
        }
        Entry::Occupied(mut entry) => match entry.get_mut() {
            ParamValue::List(values) => values.push(value),
            existing => {
                let first = std::mem::replace(existing, ParamValue::List(Vec::with_capacity(2)));
                if let ParamValue::List(values) = existing {
                    values.push(first);
                    values.push(value);
                }
            }
        },
    }
}

/// Merges `a=1&b=2` style pairs. `+` decodes to a space.
pub fn parse_url_encoded(input: &str, params: &mut Params) {
    for pair in input.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = decode_component(name);
        if name.is_empty() {
            continue;
        }
        merge_parameter(params, &name, ParamValue::Text(decode_component(value)));
    }
}

fn decode_component(component: &str) -> String {
    let component = component.replace('+', " ");
    percent_decode_str(&component)
        .decode_utf8_lossy()
        .into_owned()
}

/// Renders `params` as `a=1&b=2`. Lists become repeated pairs, files are skipped.
/// Names are emitted in sorted order so the output is stable.
pub fn url_encode(params: &Params) -> String {
    let mut names: Vec<&String> = params.keys().collect();
    names.sort();

    let mut out = String::new();
    for name in names {
        push_pairs(&mut out, name, &params[name]);
    }
    out
}

fn push_pairs(out: &mut String, name: &str, value: &ParamValue) {
    match value {
        ParamValue::Text(text) => {
            if !out.is_empty() {
                out.push('&');
            }
            out.extend(utf8_percent_encode(name, COMPONENT));
            out.push('=');
            out.extend(utf8_percent_encode(text, COMPONENT));
        }
        ParamValue::File(_) => {}
        ParamValue::List(values) => {
            for value in values {
                push_pairs(out, name, value);
            }
        }
    }
}
