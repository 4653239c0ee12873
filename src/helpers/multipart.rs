//! Streaming `multipart/form-data` decoder.
//!
//! The body is read through a fixed-size buffer. Part bodies are streamed into a
//! [`PartSink`] while the decoder looks for the next boundary, so a part may be far
//! larger than the buffer. Each part's header block must fit in one buffer.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::dev_print;
use crate::error::{Error, Result};
use crate::helpers::charset::Charset;
use crate::helpers::params::{merge_parameter, FileUpload, ParamValue, Params};
use crate::helpers::traits::bytes::FindBytes;
use crate::helpers::traits::GetMimeParameter;
use crate::Options;

const CRLF: &[u8] = b"\r\n";
const EMPTY_LINE: &[u8] = b"\r\n\r\n";
const FINAL_MARKER: &[u8] = b"--";

pub const DEFAULT_BUFFER_SIZE: usize = 8192;
pub const DEFAULT_REFILL_THRESHOLD: usize = 1024;

/// Metadata of the part being decoded, taken from its header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimePart {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl MimePart {
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    fn from_header_block(block: &str) -> MimePart {
        let mut headers: Vec<String> = Vec::new();
        for line in block.split("\r\n") {
            match headers.last_mut() {
                Some(last) if line.starts_with(' ') || line.starts_with('\t') => {
                    last.push_str(line);
                }
                _ if line.is_empty() => {}
                _ => headers.push(line.to_owned()),
            }
        }

        let mut part = MimePart::default();
        for header in &headers {
            let Some((name, value)) = header.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.eq_ignore_ascii_case("content-disposition") {
                part.name = header.get_mime_parameter("name");
                part.filename = header.get_mime_parameter("filename");
            } else if name.eq_ignore_ascii_case("content-type") {
                part.content_type = Some(value.trim().to_owned());
            }
        }
        part
    }
}

/// Write target for the body of one part.
pub trait PartSink: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Closes the sink and yields the value merged into the parameters.
    fn finalize(self: Box<Self>) -> io::Result<ParamValue>;
}

/// Opens a sink for every part the decoder meets.
pub trait SinkFactory: Send + Sync {
    fn create(&self, part: &MimePart, charset: Charset) -> io::Result<Box<dyn PartSink>>;
}

/// Keeps part bodies in memory: text for form fields, raw bytes for files.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferFactory;

impl SinkFactory for BufferFactory {
    fn create(&self, part: &MimePart, charset: Charset) -> io::Result<Box<dyn PartSink>> {
        Ok(Box::new(MemorySink::new(part.clone(), charset)))
    }
}

pub struct FactoryFn<F>(F);

/// Turns a closure into a [`SinkFactory`].
pub fn factory_fn<F>(f: F) -> FactoryFn<F>
where
    F: Fn(&MimePart, Charset) -> io::Result<Box<dyn PartSink>> + Send + Sync,
{
    FactoryFn(f)
}

impl<F> SinkFactory for FactoryFn<F>
where
    F: Fn(&MimePart, Charset) -> io::Result<Box<dyn PartSink>> + Send + Sync,
{
    fn create(&self, part: &MimePart, charset: Charset) -> io::Result<Box<dyn PartSink>> {
        (self.0)(part, charset)
    }
}

#[derive(Debug)]
pub struct MemorySink {
    part: MimePart,
    charset: Charset,
    buffer: Vec<u8>,
}

impl MemorySink {
    pub fn new(part: MimePart, charset: Charset) -> Self {
        Self {
            part,
            charset,
            buffer: Vec::new(),
        }
    }
}

impl PartSink for MemorySink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn finalize(self: Box<Self>) -> io::Result<ParamValue> {
        let MemorySink {
            part,
            charset,
            buffer,
        } = *self;
        if !part.is_file() {
            return Ok(ParamValue::Text(charset.decode(&buffer).into_owned()));
        }
        Ok(ParamValue::File(FileUpload {
            filename: part.filename.unwrap_or_default(),
            content_type: part.content_type,
            value: buffer,
        }))
    }
}

enum Phase {
    SeekBoundary,
    ParseHeaders,
    StreamBody(MimePart, Box<dyn PartSink>),
    Done,
}

/// Buffer and cursors of one decode call.
/// `0 <= position <= limit <= buffer.len()`; `[position, limit)` is the unread data.
struct ParseState<'a, R: ?Sized> {
    input: &'a mut R,
    buffer: Vec<u8>,
    position: usize,
    limit: usize,
    eof: bool,
}

impl<'a, R> ParseState<'a, R>
where
    R: AsyncRead + Unpin + ?Sized,
{
    fn new(input: &'a mut R, capacity: usize) -> Self {
        Self {
            input,
            buffer: vec![0; capacity],
            position: 0,
            limit: 0,
            eof: false,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn available(&self) -> usize {
        self.limit - self.position
    }

    fn is_full(&self) -> bool {
        self.position == 0 && self.limit == self.buffer.len()
    }

    fn find(&self, needle: &[u8]) -> Option<usize> {
        self.buffer.find_bytes(needle, self.position, self.limit)
    }

    fn unread(&self) -> &[u8] {
        &self.buffer[self.position..self.limit]
    }

    /// Moves the unread bytes to the front of the buffer.
    fn compact(&mut self) {
        if self.position == 0 {
            return;
        }
        if self.position < self.limit {
            self.buffer.copy_within(self.position..self.limit, 0);
            self.limit -= self.position;
        } else {
            self.limit = 0;
        }
        self.position = 0;
    }

    async fn read_more(&mut self) -> io::Result<usize> {
        let read = self.input.read(&mut self.buffer[self.limit..]).await?;
        if read == 0 {
            self.eof = true;
        }
        self.limit += read;
        Ok(read)
    }

    /// Best-effort refill: at most one read.
    async fn fill_once(&mut self) -> io::Result<usize> {
        self.compact();
        if self.eof || self.limit == self.capacity() {
            return Ok(0);
        }
        self.read_more().await
    }

    /// Blocking refill: reads until `threshold` unread bytes are buffered,
    /// the buffer is full or the source is exhausted.
    async fn fill_to(&mut self, threshold: usize) -> io::Result<usize> {
        self.compact();
        let threshold = threshold.min(self.capacity());
        let mut total = 0;
        while !self.eof && self.limit < threshold {
            total += self.read_more().await?;
        }
        Ok(total)
    }
}

/// Decoder for one `multipart/form-data` boundary.
pub struct MultipartDecoder<'f> {
    boundary: Vec<u8>,
    charset: Charset,
    factory: &'f dyn SinkFactory,
    buffer_size: usize,
    refill_threshold: usize,
}

impl<'f> MultipartDecoder<'f> {
    pub fn new(boundary: &str, factory: &'f dyn SinkFactory) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(FINAL_MARKER);
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            boundary: delimiter,
            charset: Charset::Utf8,
            factory,
            buffer_size: DEFAULT_BUFFER_SIZE,
            refill_threshold: DEFAULT_REFILL_THRESHOLD,
        }
    }

    /// `None` when the content type carries no (or an empty) `boundary` parameter.
    pub fn from_content_type(
        content_type: Option<&str>,
        factory: &'f dyn SinkFactory,
    ) -> Option<Self> {
        let boundary = content_type
            .get_mime_parameter("boundary")
            .filter(|boundary| !boundary.is_empty())?;
        Some(Self::new(&boundary, factory))
    }

    pub fn with_options(self, options: &Options) -> Self {
        self.charset(options.default_charset)
            .buffer_size(options.multipart_buffer_size)
            .refill_threshold(options.multipart_refill_threshold)
    }

    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn refill_threshold(mut self, refill_threshold: usize) -> Self {
        self.refill_threshold = refill_threshold;
        self
    }

    /// The buffer always has room for the body safety margin plus forward progress.
    fn capacity(&self) -> usize {
        self.buffer_size.max(2 * (self.boundary.len() + 4))
    }

    /// Decodes every part of `input` into `params`.
    pub async fn decode<R>(&self, input: &mut R, params: &mut Params) -> Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut state = ParseState::new(input, self.capacity());
        let mut phase = Phase::SeekBoundary;
        loop {
            phase = match phase {
                Phase::SeekBoundary => self.seek_boundary(&mut state).await?,
                Phase::ParseHeaders => self.parse_headers(&mut state).await?,
                Phase::StreamBody(part, sink) => {
                    self.stream_body(&mut state, part, sink, params).await?
                }
                Phase::Done => return Ok(()),
            };
        }
    }

    async fn seek_boundary<R>(&self, state: &mut ParseState<'_, R>) -> Result<Phase>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if !state.eof && state.available() < self.refill_threshold {
            state.fill_to(self.refill_threshold).await?;
        }
        loop {
            let Some(at) = state.find(&self.boundary) else {
                if state.eof {
                    return Err(Error::malformed("boundary not found in multipart stream"));
                }
                // only a boundary prefix at the very end can still become a match
                let keep = self.boundary.len() - 1;
                state.position = state.position.max(state.limit.saturating_sub(keep));
                state.fill_once().await?;
                continue;
            };

            state.position = at;
            let after = at + self.boundary.len();
            if after + 2 > state.limit {
                if state.eof {
                    return Err(Error::malformed("multipart stream ended inside a boundary"));
                }
                state.fill_to(self.boundary.len() + 2).await?;
                continue;
            }

            let tail = &state.buffer[after..after + 2];
            if tail == FINAL_MARKER {
                state.position = after + 2;
                dev_print!("reached final multipart boundary");
                return Ok(Phase::Done);
            }
            if tail != CRLF {
                return Err(Error::malformed("missing CRLF after boundary"));
            }
            state.position = after + 2;
            return Ok(Phase::ParseHeaders);
        }
    }

    async fn parse_headers<R>(&self, state: &mut ParseState<'_, R>) -> Result<Phase>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if !state.eof && state.available() < self.refill_threshold {
            state.fill_to(self.refill_threshold).await?;
        }
        let (block_end, body_start) = loop {
            if state.unread().starts_with(CRLF) {
                break (state.position, state.position + CRLF.len());
            }
            if let Some(at) = state.find(EMPTY_LINE) {
                break (at, at + EMPTY_LINE.len());
            }
            if state.eof {
                return Err(Error::malformed("could not find end of part headers"));
            }
            if state.is_full() {
                return Err(Error::malformed("part headers exceed the buffer size"));
            }
            let capacity = state.capacity();
            state.fill_to(capacity).await?;
        };

        let part = {
            let block = self.charset.decode(&state.buffer[state.position..block_end]);
            MimePart::from_header_block(&block)
        };
        state.position = body_start;
        dev_print!(
            "multipart part name={:?} filename={:?} content_type={:?}",
            part.name,
            part.filename,
            part.content_type
        );

        let sink = self.factory.create(&part, self.charset)?;
        Ok(Phase::StreamBody(part, sink))
    }

    async fn stream_body<R>(
        &self,
        state: &mut ParseState<'_, R>,
        part: MimePart,
        mut sink: Box<dyn PartSink>,
        params: &mut Params,
    ) -> Result<Phase>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        // a boundary split across two reads is never shorter than this
        let margin = self.boundary.len() + 2;
        loop {
            if let Some(at) = state.find(&self.boundary) {
                let end = line_break_start(&state.buffer, state.position, at);
                sink.write(&state.buffer[state.position..end])?;
                // the boundary stays unread for seek_boundary
                state.position = at;
                let value = sink.finalize()?;
                match part.name {
                    Some(name) => merge_parameter(params, &name, value),
                    None => tracing::debug!("discarding multipart part without a name"),
                }
                return Ok(Phase::SeekBoundary);
            }

            if state.eof {
                return Err(Error::malformed("multipart stream ended before the final boundary"));
            }

            let end = state.limit.saturating_sub(margin).max(state.position);
            sink.write(&state.buffer[state.position..end])?;
            state.position = end;
            state.fill_once().await?;
        }
    }
}

/// Start of the line break right before the boundary at `at`, never before `from`.
fn line_break_start(buffer: &[u8], from: usize, at: usize) -> usize {
    if at >= from + 2 && &buffer[at - 2..at] == CRLF {
        at - 2
    } else if at > from && buffer[at - 1] == b'\n' {
        at - 1
    } else {
        at
    }
}

/// Decodes a multipart body into `params`.
///
/// Does nothing when `content_type` has no `boundary` parameter: the body is
/// simply not multipart.
pub async fn parse_file_upload<R>(
    content_type: Option<&str>,
    input: &mut R,
    params: &mut Params,
    factory: &dyn SinkFactory,
    options: &Options,
) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let Some(decoder) = MultipartDecoder::from_content_type(content_type, factory) else {
        return Ok(());
    };
    let decoder = decoder.with_options(options);
    if let Err(e) = decoder.decode(input, params).await {
        tracing::warn!("multipart decoding failed: {}", e);
        return Err(e);
    }
    Ok(())
}
