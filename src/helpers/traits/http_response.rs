use std::error::Error;

use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::helpers::charset::Charset;
use crate::helpers::headers::Headers;
use crate::helpers::traits::GetMimeParameter;
use crate::{dev_print, Response, ResponseBody, Writer};

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: ResponseBody::empty(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::with_text("text/html; charset=utf-8", body)
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::with_text("text/plain; charset=utf-8", body)
    }

    pub fn json<T: Serialize>(value: &T) -> crate::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::bytes("application/json", body))
    }

    pub fn bytes(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let mut response = Self::new(StatusCode::OK);
        response.headers.set("Content-Type", content_type);
        response.body = ResponseBody::from_bytes(body);
        response
    }

    fn with_text(content_type: &str, body: impl Into<String>) -> Self {
        let mut response = Self::new(StatusCode::OK);
        response.headers.set("Content-Type", content_type);
        response.body = ResponseBody::from_text(body);
        response
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Charset declared by the `Content-Type` header, if recognised.
    pub fn charset(&self) -> Option<Charset> {
        declared_charset(&self.headers)
    }
}

pub fn declared_charset(headers: &Headers) -> Option<Charset> {
    let label = headers.get("content-type").get_mime_parameter("charset")?;
    let charset = Charset::from_label(&label);
    if charset.is_none() {
        tracing::debug!("unsupported response charset {:?}", label);
    }
    charset
}

#[async_trait]
pub trait ResponseUtil {
    async fn responser(self, writer: &mut Writer) -> Result<(), Box<dyn Error + Send + Sync>>;
}

#[async_trait]
impl ResponseUtil for Response {
    async fn responser(self, writer: &mut Writer) -> Result<(), Box<dyn Error + Send + Sync>> {
        let Response {
            status,
            mut headers,
            body,
        } = self;
        let charset = declared_charset(&headers).unwrap_or(writer.options.default_charset);
        let body = body.collect_bytes(charset);

        let bodyless = status == StatusCode::NOT_MODIFIED
            || status == StatusCode::NO_CONTENT
            || status.is_informational();
        if !bodyless && !headers.contains("content-length") {
            headers.set("Content-Length", body.len().to_string());
        }

        let mut send_string = format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );
        // one physical line per joined value
        for (name, value) in headers.iter() {
            send_string.push_str(&format!("{}: {}\r\n", name, value));
        }
        send_string.push_str("\r\n");
        dev_print!("response head: {:?}", &send_string);

        let mut bytes = send_string.into_bytes();
        if !bodyless {
            bytes.extend_from_slice(&body);
        }
        writer.stream.write_all(&bytes).await?;
        writer.stream.flush().await?;
        Ok(())
    }
}
