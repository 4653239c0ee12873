use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::net::SocketAddr;

#[cfg(feature = "env")]
use std::str::FromStr;

use http::{Method, StatusCode, Uri, Version};
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::net::TcpStream;

pub mod application;
pub mod error;
pub mod helpers;
pub mod middleware;

pub use application::Application;
pub use error::{Error, Result};
pub use helpers::charset::Charset;
pub use helpers::headers::Headers;
pub use helpers::multipart::{
    factory_fn, parse_file_upload, BufferFactory, MemorySink, MimePart, MultipartDecoder,
    PartSink, SinkFactory,
};
pub use helpers::params::{
    merge_parameter, parse_url_encoded, url_encode, FileUpload, ParamValue, Params,
};
pub use helpers::traits::http_request::RequestUtils;
pub use helpers::traits::http_response::ResponseUtil;
pub use helpers::traits::http_stream::StreamHttp;
pub use middleware::{build, handler_fn, middleware_fn, BoxHandler, Handler, Middleware};

pub mod external {
    pub use async_trait;
    #[cfg(feature = "env")]
    pub use dotenv;
    pub use http;
    pub use tokio;
    pub use tracing;
}

#[macro_export]
macro_rules! dev_print {
    ($($rest:tt)*) => {
        if cfg!(feature = "debug") {
            $crate::external::tracing::debug!($($rest)*)
        }
    };
}

pub type SendableError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Options {
    pub no_delay: bool,
    pub read_timeout_miliseconds: u64,
    pub read_buffer_size: usize,
    pub multipart_buffer_size: usize,
    /// Minimum unread bytes wanted before a new multipart part is parsed.
    pub multipart_refill_threshold: usize,
    pub default_charset: Charset,
    /// Regex matched against the response `Content-Type` by the gzip interceptor.
    pub gzip_content_types: String,
    pub gzip_level: u32,
    pub max_form_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options::new()
    }
}

impl Options {
    pub fn new() -> Options {
        let mut _options = Options {
            no_delay: true,
            read_timeout_miliseconds: 3000,
            read_buffer_size: 4096,
            multipart_buffer_size: 8192,
            multipart_refill_threshold: 1024,
            default_charset: Charset::Utf8,
            gzip_content_types: middleware::gzip::DEFAULT_CONTENT_TYPES.into(),
            gzip_level: 9,
            max_form_size: 2 * 1024 * 1024,
        };

        #[cfg(feature = "env")]
        {
            use std::env;
            dotenv::dotenv().ok();

            if let Ok(data) = env::var("NO_DELAY") {
                if let Ok(data) = data.parse::<bool>() {
                    _options.no_delay = data;
                }
            }

            if let Ok(data) = env::var("READ_TIMEOUT_MILISECONDS") {
                if let Ok(data) = data.parse::<u64>() {
                    _options.read_timeout_miliseconds = data;
                }
            }

            if let Ok(data) = env::var("READ_BUFFER_SIZE") {
                if let Ok(data) = data.parse::<usize>() {
                    _options.read_buffer_size = data;
                }
            }

            if let Ok(data) = env::var("MULTIPART_BUFFER_SIZE") {
                if let Ok(data) = data.parse::<usize>() {
                    _options.multipart_buffer_size = data;
                }
            }

            if let Ok(data) = env::var("MULTIPART_REFILL_THRESHOLD") {
                if let Ok(data) = data.parse::<usize>() {
                    _options.multipart_refill_threshold = data;
                }
            }

            if let Ok(data) = env::var("DEFAULT_CHARSET") {
                if let Ok(data) = Charset::from_str(&data) {
                    _options.default_charset = data;
                }
            }

            if let Ok(data) = env::var("GZIP_CONTENT_TYPES") {
                _options.gzip_content_types = data;
            }

            if let Ok(data) = env::var("GZIP_LEVEL") {
                if let Ok(data) = data.parse::<u32>() {
                    _options.gzip_level = data;
                }
            }

            if let Ok(data) = env::var("MAX_FORM_SIZE") {
                if let Ok(data) = data.parse::<usize>() {
                    _options.max_form_size = data;
                }
            }
        }

        _options
    }

    /// Rejects values no request could be processed with.
    pub fn validate(&self) -> Result<()> {
        if self.multipart_buffer_size == 0 {
            return Err(Error::Configuration(
                "multipart_buffer_size must be greater than zero".into(),
            ));
        }
        if self.multipart_refill_threshold > self.multipart_buffer_size {
            return Err(Error::Configuration(format!(
                "multipart_refill_threshold ({}) exceeds multipart_buffer_size ({})",
                self.multipart_refill_threshold, self.multipart_buffer_size
            )));
        }
        if self.gzip_level > 9 {
            return Err(Error::Configuration(format!(
                "gzip_level must be between 0 and 9, got {}",
                self.gzip_level
            )));
        }
        Ok(())
    }
}

pub struct Server {
    pub listener: TcpListener,
    pub options: Options,
}

impl Server {
    pub async fn new(address: &str) -> std::result::Result<Server, SendableError> {
        Self::with_options(address, Options::new()).await
    }

    pub async fn with_options(
        address: &str,
        options: Options,
    ) -> std::result::Result<Server, SendableError> {
        options.validate()?;
        dev_print!("server bound to {}", address);
        Ok(Server {
            listener: TcpListener::bind(address).await?,
            options,
        })
    }

    pub async fn accept(&mut self) -> std::result::Result<Accept, SendableError> {
        let (stream, addr) = self.listener.accept().await?;
        Ok(Accept::new(stream, addr, self.options.clone()))
    }
}

pub struct Accept {
    pub tcp_stream: TcpStream,
    pub addr: SocketAddr,
    pub option: Options,
}

impl Accept {
    pub fn new(tcp_stream: TcpStream, addr: SocketAddr, option: Options) -> Self {
        Self {
            tcp_stream,
            addr,
            option,
        }
    }

    pub async fn parse_request(self) -> std::result::Result<(Request, Writer), SendableError> {
        let (mut request, writer) = self.tcp_stream.parse_request(&self.option).await?;
        request.body.ip = Some(self.addr);
        Ok((request, writer))
    }
}

/// Single-pass request body source.
pub type BodySource = Box<dyn AsyncRead + Send + Unpin>;

pub struct Body {
    source: Option<BodySource>,
    /// Declared `Content-Length`, when known.
    pub len: Option<usize>,
    pub ip: Option<SocketAddr>,
}

impl Body {
    pub fn empty() -> Self {
        Self {
            source: None,
            len: Some(0),
            ip: None,
        }
    }

    pub fn new(source: impl AsyncRead + Send + Unpin + 'static, len: Option<usize>) -> Self {
        Self {
            source: Some(Box::new(source)),
            len,
            ip: None,
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len();
        Self::new(Cursor::new(bytes), Some(len))
    }

    /// Hands out the source once. Later calls return `None`.
    pub fn take_source(&mut self) -> Option<BodySource> {
        self.source.take()
    }

    pub fn is_consumed(&self) -> bool {
        self.source.is_none()
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("consumed", &self.is_consumed())
            .field("len", &self.len)
            .field("ip", &self.ip)
            .finish()
    }
}

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: Headers,
    pub body: Body,
    pub params: Params,
    /// Filled by the cookies interceptor.
    pub cookies: Option<HashMap<String, String>>,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: Headers::new(),
            body: Body::empty(),
            params: Params::new(),
            cookies: None,
        }
    }

    pub fn get(uri: &'static str) -> Self {
        Self::new(Method::GET, Uri::from_static(uri))
    }

    pub fn post(uri: &'static str) -> Self {
        Self::new(Method::POST, Uri::from_static(uri))
    }

    pub fn with_header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.as_ref()?.get(name).map(String::as_str)
    }
}

/// One piece of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Text(String),
    Bytes(Vec<u8>),
}

impl Chunk {
    /// Text is encoded with `charset`; bytes pass through.
    pub fn into_bytes(self, charset: Charset) -> Vec<u8> {
        match self {
            Chunk::Text(text) => charset.encode(&text).into_owned(),
            Chunk::Bytes(bytes) => bytes,
        }
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk::Text(text)
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(bytes)
    }
}

/// Lazy, single-pass sequence of body chunks.
///
/// Iterating consumes the body. Anything that needs the bytes twice has to
/// buffer them and put a new body back on the response.
pub struct ResponseBody {
    chunks: Box<dyn Iterator<Item = Chunk> + Send>,
    digest: Option<String>,
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self::from_chunks(Vec::new())
    }

    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Chunk>,
        I::IntoIter: Send + 'static,
    {
        Self {
            chunks: Box::new(chunks.into_iter()),
            digest: None,
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_chunks(std::iter::once(Chunk::Bytes(bytes.into())))
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_chunks(std::iter::once(Chunk::Text(text.into())))
    }

    /// Attaches a precomputed content digest.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Consumes the body into one buffer.
    pub fn collect_bytes(self, charset: Charset) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in self {
            match chunk {
                Chunk::Bytes(bytes) => out.extend_from_slice(&bytes),
                Chunk::Text(text) => out.extend_from_slice(&charset.encode(&text)),
            }
        }
        out
    }
}

impl Iterator for ResponseBody {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        self.chunks.next()
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::empty()
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: ResponseBody,
}

pub struct Writer {
    pub stream: OwnedWriteHalf,
    pub options: Options,
}
