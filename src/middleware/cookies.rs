use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::middleware::{BoxHandler, Handler, Middleware};
use crate::{Options, Request, Response};

/// Parses the `Cookie` header into [`Request::cookies`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiesMiddleware;

impl Middleware for CookiesMiddleware {
    fn name(&self) -> &str {
        "cookies"
    }

    fn wrap(&self, next: BoxHandler, _options: &Options) -> BoxHandler {
        Arc::new(Cookies { next })
    }
}

struct Cookies {
    next: BoxHandler,
}

#[async_trait]
impl Handler for Cookies {
    async fn call(&self, request: &mut Request) -> Result<Response> {
        if request.cookies.is_none() {
            let cookies = parse_cookies(request.headers.get_all("cookie"));
            request.cookies = Some(cookies);
        }
        self.next.call(request).await
    }
}

/// A name sent more than once keeps its first value.
pub fn parse_cookies<'a>(headers: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in headers {
        for pair in header.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            cookies
                .entry(name.trim().to_owned())
                .or_insert_with(|| value.trim().to_owned());
        }
    }
    cookies
}
