use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::helpers::multipart::{parse_file_upload, BufferFactory};
use crate::helpers::params::parse_url_encoded;
use crate::helpers::traits::http_request::RequestUtils;
use crate::helpers::traits::{is_file_upload, is_url_encoded};
use crate::middleware::{BoxHandler, Handler, Middleware};
use crate::{Options, Request, Response};

/// Fills [`Request::params`] from the query string and form bodies
/// (url-encoded or multipart).
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamsMiddleware;

impl Middleware for ParamsMiddleware {
    fn name(&self) -> &str {
        "params"
    }

    fn wrap(&self, next: BoxHandler, options: &Options) -> BoxHandler {
        Arc::new(ParamsHandler {
            next,
            options: options.clone(),
        })
    }
}

struct ParamsHandler {
    next: BoxHandler,
    options: Options,
}

#[async_trait]
impl Handler for ParamsHandler {
    async fn call(&self, request: &mut Request) -> Result<Response> {
        if let Some(query) = request.uri.query() {
            parse_url_encoded(query, &mut request.params);
        }

        let content_type = request.content_type().map(str::to_owned);
        if is_url_encoded(content_type.as_deref()) {
            let bytes = request.read_body(self.options.max_form_size).await?;
            let text = self.options.default_charset.decode(&bytes).into_owned();
            parse_url_encoded(&text, &mut request.params);
        } else if is_file_upload(content_type.as_deref()) {
            if let Some(mut source) = request.body.take_source() {
                parse_file_upload(
                    content_type.as_deref(),
                    &mut source,
                    &mut request.params,
                    &BufferFactory,
                    &self.options,
                )
                .await?;
            }
        }

        self.next.call(request).await
    }
}
