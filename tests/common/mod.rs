#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Hands out at most `step` bytes per read to force many refills.
pub struct ThrottledReader {
    data: Vec<u8>,
    offset: usize,
    step: usize,
}

impl ThrottledReader {
    pub fn new(data: impl Into<Vec<u8>>, step: usize) -> Self {
        Self {
            data: data.into(),
            offset: 0,
            step: step.max(1),
        }
    }
}

impl AsyncRead for ThrottledReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let remaining = self.data.len() - self.offset;
        let n = remaining.min(self.step).min(buf.remaining());
        let start = self.offset;
        buf.put_slice(&self.data[start..start + n]);
        self.offset += n;
        Poll::Ready(Ok(()))
    }
}

/// Fails every read after the first `ok_bytes` bytes.
pub struct FailingReader {
    inner: ThrottledReader,
    ok_bytes: usize,
}

impl FailingReader {
    pub fn new(data: impl Into<Vec<u8>>, ok_bytes: usize) -> Self {
        Self {
            inner: ThrottledReader::new(data, 16),
            ok_bytes,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.inner.offset >= self.ok_bytes {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

pub enum Field<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

/// Renders a well-formed multipart/form-data body.
pub fn multipart_body(boundary: &str, fields: &[Field<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for field in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match field {
            Field::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Field::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}
