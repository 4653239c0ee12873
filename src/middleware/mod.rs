//! Interceptor chain.
//!
//! A [`Middleware`] turns the next handler into a new handler with the same
//! contract. [`build`] folds an ordered list around a base handler: the first
//! middleware sees the request first and the response last.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::{dev_print, Options, Request, Response};

pub mod cookies;
pub mod etag;
pub mod gzip;
pub mod params;

pub use cookies::CookiesMiddleware;
pub use etag::{Digest, DigestFactory, EtagMiddleware, Sha256Factory};
pub use gzip::{Compressor, CompressorFactory, GzipCompressor, GzipFactory, GzipMiddleware};
pub use params::ParamsMiddleware;

#[async_trait]
pub trait Handler: Send + Sync {
    /// The request is borrowed mutably so changes made by one interceptor
    /// are seen by every handler invoked after it.
    async fn call(&self, request: &mut Request) -> Result<Response>;
}

pub type BoxHandler = Arc<dyn Handler>;

pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;
    fn wrap(&self, next: BoxHandler, options: &Options) -> BoxHandler;
}

/// Composes `middleware` around `base`, outermost first.
pub fn build(middleware: &[Box<dyn Middleware>], base: BoxHandler, options: &Options) -> BoxHandler {
    middleware.iter().rev().fold(base, |next, layer| {
        dev_print!("wrapping handler with {}", layer.name());
        layer.wrap(next, options)
    })
}

pub struct HandlerFn<F>(F);

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: Fn(&mut Request) -> Result<Response> + Send + Sync,
{
    async fn call(&self, request: &mut Request) -> Result<Response> {
        (self.0)(request)
    }
}

/// Wraps a synchronous closure as a handler.
pub fn handler_fn<F>(f: F) -> BoxHandler
where
    F: Fn(&mut Request) -> Result<Response> + Send + Sync + 'static,
{
    Arc::new(HandlerFn(f))
}

pub struct MiddlewareFn<F> {
    name: String,
    wrap: F,
}

impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(BoxHandler, &Options) -> BoxHandler + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, next: BoxHandler, options: &Options) -> BoxHandler {
        (self.wrap)(next, options)
    }
}

/// Wraps a closure as a named middleware.
pub fn middleware_fn<F>(name: &str, wrap: F) -> Box<dyn Middleware>
where
    F: Fn(BoxHandler, &Options) -> BoxHandler + Send + Sync + 'static,
{
    Box::new(MiddlewareFn {
        name: name.to_owned(),
        wrap,
    })
}
