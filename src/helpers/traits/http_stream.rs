use std::error::Error;
use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::helpers::headers::Headers;
use crate::helpers::traits::{extract_content_length_fast, find_header_end_optimized};
use crate::{dev_print, Body, Options, Request, Writer};

/// Upper bound for a request head; larger heads are rejected.
const MAX_HEAD_SIZE: usize = 64 * 1024;

#[async_trait]
pub trait StreamHttp {
    async fn parse_request(
        self,
        options: &Options,
    ) -> Result<(Request, Writer), Box<dyn Error + Send + Sync>>;
}

#[async_trait]
impl StreamHttp for TcpStream {
    async fn parse_request(
        self,
        options: &Options,
    ) -> Result<(Request, Writer), Box<dyn Error + Send + Sync>> {
        self.set_nodelay(options.no_delay)?;
        let (mut read_half, write_half) = self.into_split();

        let timeout = Duration::from_millis(options.read_timeout_miliseconds);
        let (head, rest) =
            tokio::time::timeout(timeout, read_head(&mut read_half, options.read_buffer_size))
                .await??;

        let mut request = get_request(&head)?;
        let content_length = extract_content_length_fast(&head).unwrap_or(0);
        let remaining = content_length.saturating_sub(rest.len()) as u64;
        let mut rest = rest;
        rest.truncate(content_length);
        request.body = Body::new(
            Cursor::new(rest).chain(read_half.take(remaining)),
            Some(content_length),
        );

        Ok((
            request,
            Writer {
                stream: write_half,
                options: options.clone(),
            },
        ))
    }
}

/// Reads until the end of the request head. Returns the head and any body bytes
/// that arrived with it.
async fn read_head<R>(
    stream: &mut R,
    buffer_size: usize,
) -> Result<(Vec<u8>, Vec<u8>), Box<dyn Error + Send + Sync>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut bytes: Vec<u8> = vec![];
    let mut buf = vec![0; buffer_size.max(512)];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err("connection closed before the request head was complete".into());
        }
        bytes.extend_from_slice(&buf[..n]);

        if let Some(headers_end) = find_header_end_optimized(&bytes) {
            let body = bytes.split_off(headers_end + 4);
            bytes.truncate(headers_end);
            return Ok((bytes, body));
        }
        if bytes.len() > MAX_HEAD_SIZE {
            return Err("request head too large".into());
        }
    }
}

fn get_request(head: &[u8]) -> Result<Request, Box<dyn Error + Send + Sync>> {
    let head = String::from_utf8_lossy(head);
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    dev_print!("request line: {}", request_line);
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or("GET").parse::<http::Method>()?;
    let uri = parts.next().unwrap_or("/").parse::<http::Uri>()?;
    let version = match parts.next() {
        Some("HTTP/0.9") => http::Version::HTTP_09,
        Some("HTTP/1.0") => http::Version::HTTP_10,
        _ => http::Version::HTTP_11,
    };

    let mut headers = Headers::new();
    for line in lines {
        match line.split_once(':') {
            Some((key, value)) => headers.add(key.trim(), value.trim()),
            None => dev_print!("skipping malformed header line {:?}", line),
        }
    }

    let mut request = Request::new(method, uri);
    request.version = version;
    request.headers = headers;
    Ok(request)
}
