pub mod bytes;
pub mod http_request;
pub mod http_response;
pub mod http_stream;

/// Reads `;`-separated MIME parameters out of a header value,
/// e.g. `charset` from `text/plain; charset=UTF-8`.
pub trait GetMimeParameter {
    fn get_mime_parameter(&self, param_name: &str) -> Option<String>;
}

impl GetMimeParameter for str {
    fn get_mime_parameter(&self, param_name: &str) -> Option<String> {
        let mut end = 0;
        while let Some(semi) = self[end..].find(';') {
            let start = end + semi + 1;
            end = self[start..]
                .find(';')
                .map(|i| start + i)
                .unwrap_or(self.len());
            let segment = &self[start..end];
            let Some(eq) = segment.find('=') else {
                continue;
            };
            if !segment[..eq].trim().eq_ignore_ascii_case(param_name) {
                continue;
            }
            let value = segment[eq + 1..].trim();
            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                return Some(unescape_quoted(&value[1..value.len() - 1]));
            }
            if value.len() >= 2 && value.starts_with('<') && value.ends_with('>') {
                return Some(value[1..value.len() - 1].to_owned());
            }
            return Some(value.to_owned());
        }
        None
    }
}

impl GetMimeParameter for Option<&str> {
    fn get_mime_parameter(&self, param_name: &str) -> Option<String> {
        self.and_then(|value| value.get_mime_parameter(param_name))
    }
}

fn unescape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// True when the content type denotes a body the multipart decoder can parse.
pub fn is_file_upload(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| {
        value
            .trim_start()
            .get(..19)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/form-data"))
    })
}

/// True for `application/x-www-form-urlencoded` bodies.
pub fn is_url_encoded(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| {
        value
            .split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
    })
}

pub fn find_header_end_optimized(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|window| window == b"\r\n\r\n")
}

pub fn extract_content_length_fast(headers: &[u8]) -> Option<usize> {
    let headers_str = std::str::from_utf8(headers).ok()?;
    headers_str
        .lines()
        .find(|line| line.to_ascii_lowercase().starts_with("content-length:"))
        .and_then(|line| line.split(':').nth(1)?.trim().parse().ok())
}
