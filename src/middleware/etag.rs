//! Conditional GET based on a digest of the response body.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use sha2::Sha256;

use crate::error::Result;
use crate::helpers::charset::Charset;
use crate::middleware::{BoxHandler, Handler, Middleware};
use crate::{dev_print, Options, Request, Response, ResponseBody};

/// Incremental digest producing a hex string.
pub trait Digest: Send {
    fn update(&mut self, bytes: &[u8]);
    fn finalize_hex(self: Box<Self>) -> String;
}

pub trait DigestFactory: Send + Sync {
    fn create(&self) -> Box<dyn Digest>;
}

/// SHA-256, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Factory;

struct Sha256Digest(Sha256);

impl Digest for Sha256Digest {
    fn update(&mut self, bytes: &[u8]) {
        sha2::Digest::update(&mut self.0, bytes);
    }

    fn finalize_hex(self: Box<Self>) -> String {
        hex::encode(sha2::Digest::finalize(self.0))
    }
}

impl DigestFactory for Sha256Factory {
    fn create(&self) -> Box<dyn Digest> {
        Box::new(Sha256Digest(<Sha256 as sha2::Digest>::new()))
    }
}

pub struct EtagMiddleware {
    digest: Arc<dyn DigestFactory>,
}

impl EtagMiddleware {
    pub fn new(digest: Arc<dyn DigestFactory>) -> Self {
        Self { digest }
    }
}

impl Default for EtagMiddleware {
    fn default() -> Self {
        Self::new(Arc::new(Sha256Factory))
    }
}

impl Middleware for EtagMiddleware {
    fn name(&self) -> &str {
        "etag"
    }

    fn wrap(&self, next: BoxHandler, options: &Options) -> BoxHandler {
        Arc::new(Etag {
            next,
            digest: Arc::clone(&self.digest),
            default_charset: options.default_charset,
        })
    }
}

struct Etag {
    next: BoxHandler,
    digest: Arc<dyn DigestFactory>,
    default_charset: Charset,
}

impl Etag {
    /// Digests the body, buffering it when no digest was precomputed.
    /// Returns the digest (if the body is non-empty) and the buffered bytes.
    fn digest_body(&self, response: &mut Response) -> (Option<String>, Option<Vec<u8>>) {
        if let Some(code) = response.body.digest() {
            return (Some(code.to_owned()), None);
        }

        let charset = response.charset().unwrap_or(self.default_charset);
        let mut digest = self.digest.create();
        let mut buffered = Vec::new();
        for chunk in std::mem::take(&mut response.body) {
            let bytes = chunk.into_bytes(charset);
            digest.update(&bytes);
            buffered.extend_from_slice(&bytes);
        }

        if buffered.is_empty() {
            (None, Some(buffered))
        } else {
            (Some(digest.finalize_hex()), Some(buffered))
        }
    }
}

fn if_none_match(request: &Request) -> impl Iterator<Item = &str> {
    request
        .headers
        .get_all("if-none-match")
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
}

#[async_trait]
impl Handler for Etag {
    async fn call(&self, request: &mut Request) -> Result<Response> {
        let mut response = self.next.call(request).await?;
        if response.status != StatusCode::OK {
            return Ok(response);
        }

        let (code, buffered) = self.digest_body(&mut response);
        let Some(code) = code else {
            if let Some(bytes) = buffered {
                response.body = ResponseBody::from_bytes(bytes);
            }
            return Ok(response);
        };

        let etag = format!("\"{}\"", code);
        response.headers.set("ETag", &etag);

        if if_none_match(request).any(|tag| tag == etag) {
            dev_print!("etag {} matched, answering 304", etag);
            let mut headers = response.headers;
            headers.unset("Content-Length");
            return Ok(Response {
                status: StatusCode::NOT_MODIFIED,
                headers,
                body: ResponseBody::empty(),
            });
        }

        if let Some(bytes) = buffered {
            // the original body was consumed while digesting
            response.body = ResponseBody::from_bytes(bytes).with_digest(code);
        }
        Ok(response)
    }
}
