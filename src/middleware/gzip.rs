//! On-the-fly gzip compression of response bodies.
//!
//! Only content types matching [`Options::gzip_content_types`] are compressed,
//! text types by default.

use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::StatusCode;
use regex::Regex;

use crate::error::{Error, Result};
use crate::helpers::charset::Charset;
use crate::middleware::{BoxHandler, Handler, Middleware};
use crate::{dev_print, Options, Request, Response, ResponseBody};

pub const DEFAULT_CONTENT_TYPES: &str = "^text|xml|json|javascript";

pub trait Compressor: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn finish(self: Box<Self>) -> io::Result<Vec<u8>>;
}

pub trait CompressorFactory: Send + Sync {
    fn create(&self, level: u32) -> Box<dyn Compressor>;
}

pub struct GzipCompressor {
    encoder: GzEncoder<Vec<u8>>,
}

impl GzipCompressor {
    pub fn with_level(level: u32) -> Self {
        Self {
            encoder: GzEncoder::new(Vec::new(), Compression::new(level)),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::with_level(Compression::default().level())
    }
}

impl Compressor for GzipCompressor {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.encoder.write_all(bytes)
    }

    fn finish(self: Box<Self>) -> io::Result<Vec<u8>> {
        self.encoder.finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GzipFactory;

impl CompressorFactory for GzipFactory {
    fn create(&self, level: u32) -> Box<dyn Compressor> {
        Box::new(GzipCompressor::with_level(level))
    }
}

pub struct GzipMiddleware {
    content_types: Regex,
    level: u32,
    compressor: Arc<dyn CompressorFactory>,
}

impl GzipMiddleware {
    pub fn new(options: &Options) -> Result<Self> {
        Ok(Self {
            content_types: compile_content_types(&options.gzip_content_types)?,
            level: options.gzip_level,
            compressor: Arc::new(GzipFactory),
        })
    }

    pub fn content_types(mut self, pattern: &str) -> Result<Self> {
        self.content_types = compile_content_types(pattern)?;
        Ok(self)
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn compressor(mut self, compressor: Arc<dyn CompressorFactory>) -> Self {
        self.compressor = compressor;
        self
    }
}

fn compile_content_types(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        Error::Configuration(format!("invalid gzip content type pattern {:?}: {}", pattern, e))
    })
}

impl Middleware for GzipMiddleware {
    fn name(&self) -> &str {
        "gzip"
    }

    fn wrap(&self, next: BoxHandler, options: &Options) -> BoxHandler {
        Arc::new(Gzip {
            next,
            content_types: self.content_types.clone(),
            level: self.level,
            compressor: Arc::clone(&self.compressor),
            default_charset: options.default_charset,
        })
    }
}

struct Gzip {
    next: BoxHandler,
    content_types: Regex,
    level: u32,
    compressor: Arc<dyn CompressorFactory>,
    default_charset: Charset,
}

impl Gzip {
    fn can_compress(&self, request: &Request, response: &Response) -> bool {
        if response.status != StatusCode::OK || response.headers.contains("content-encoding") {
            return false;
        }
        let accepts_gzip = request
            .headers
            .get_all("accept-encoding")
            .any(|value| value.contains("gzip"));
        if !accepts_gzip {
            return false;
        }
        let content_type = response
            .headers
            .get_all("content-type")
            .collect::<Vec<_>>()
            .join(", ");
        !content_type.is_empty() && self.content_types.is_match(&content_type)
    }

    fn compress(&self, body: ResponseBody, charset: Charset) -> io::Result<Vec<u8>> {
        let mut compressor = self.compressor.create(self.level);
        for chunk in body {
            compressor.write(&chunk.into_bytes(charset))?;
        }
        compressor.finish()
    }
}

#[async_trait]
impl Handler for Gzip {
    async fn call(&self, request: &mut Request) -> Result<Response> {
        let mut response = self.next.call(request).await?;
        if !self.can_compress(request, &response) {
            return Ok(response);
        }

        let charset = response.charset().unwrap_or(self.default_charset);
        let compressed = self.compress(std::mem::take(&mut response.body), charset)?;
        dev_print!("gzip compressed response body to {} bytes", compressed.len());

        response.headers.set("Content-Encoding", "gzip");
        // the declared length describes the uncompressed body
        response.headers.unset("Content-Length");
        let varies = response
            .headers
            .get_all("vary")
            .flat_map(|value| value.split(','))
            .any(|value| value.trim().eq_ignore_ascii_case("accept-encoding"));
        if !varies {
            response.headers.add("Vary", "Accept-Encoding");
        }
        response.body = ResponseBody::from_bytes(compressed);
        Ok(response)
    }
}
