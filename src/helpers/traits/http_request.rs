use std::io;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::error::Result;
use crate::helpers::multipart::{parse_file_upload, SinkFactory};
use crate::helpers::params::Params;
use crate::helpers::traits::is_file_upload;
use crate::{Options, Request};

#[async_trait]
pub trait RequestUtils {
    /// Reads the whole body once. Fails if it is longer than `max_len`.
    async fn read_body(&mut self, max_len: usize) -> Result<Vec<u8>>;
    /// `None` unless the request is `multipart/form-data`.
    async fn get_multi_part(
        &mut self,
        factory: &dyn SinkFactory,
        options: &Options,
    ) -> Result<Option<Params>>;
}

#[async_trait]
impl RequestUtils for Request {
    async fn read_body(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let Some(source) = self.body.take_source() else {
            return Ok(Vec::new());
        };
        let mut bytes = Vec::with_capacity(self.body.len.unwrap_or(0).min(max_len));
        source
            .take(max_len as u64 + 1)
            .read_to_end(&mut bytes)
            .await?;
        if bytes.len() > max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("request body exceeds {} bytes", max_len),
            )
            .into());
        }
        Ok(bytes)
    }

    async fn get_multi_part(
        &mut self,
        factory: &dyn SinkFactory,
        options: &Options,
    ) -> Result<Option<Params>> {
        let content_type = self.content_type().map(str::to_owned);
        if !is_file_upload(content_type.as_deref()) {
            return Ok(None);
        }
        let mut params = Params::new();
        if let Some(mut source) = self.body.take_source() {
            parse_file_upload(
                content_type.as_deref(),
                &mut source,
                &mut params,
                factory,
                options,
            )
            .await?;
        }
        Ok(Some(params))
    }
}
