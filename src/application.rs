use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::middleware::{
    self, BoxHandler, CookiesMiddleware, DigestFactory, EtagMiddleware, GzipMiddleware,
    Middleware, ParamsMiddleware, Sha256Factory,
};
use crate::{dev_print, Options};

pub type MiddlewareFactory = Arc<dyn Fn(&Application) -> Result<Box<dyn Middleware>> + Send + Sync>;

/// Chain configuration: interceptors are picked by name in the order they
/// should see requests.
///
/// ```ignore
/// let mut app = Application::new();
/// app.configure(&["cookies", "params", "etag", "gzip"])?;
/// let handler = app.build(handler_fn(|_req| Ok(Response::text("hello"))))?;
/// ```
pub struct Application {
    pub options: Options,
    middleware: Vec<Box<dyn Middleware>>,
    registry: HashMap<String, MiddlewareFactory>,
    digest: Arc<dyn DigestFactory>,
}

impl Default for Application {
    fn default() -> Self {
        Application::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self::with_options(Options::new())
    }

    pub fn with_options(options: Options) -> Self {
        let mut app = Self {
            options,
            middleware: Vec::new(),
            registry: HashMap::new(),
            digest: Arc::new(Sha256Factory),
        };
        app.register("cookies", |_| Ok(Box::new(CookiesMiddleware)));
        app.register("params", |_| Ok(Box::new(ParamsMiddleware)));
        app.register("etag", |app| Ok(Box::new(EtagMiddleware::new(app.digest()))));
        app.register("gzip", |app| Ok(Box::new(GzipMiddleware::new(&app.options)?)));
        app
    }

    /// Digest used by the `etag` interceptor. Must be set before `configure`.
    pub fn with_digest(mut self, digest: Arc<dyn DigestFactory>) -> Self {
        self.digest = digest;
        self
    }

    pub fn digest(&self) -> Arc<dyn DigestFactory> {
        Arc::clone(&self.digest)
    }

    /// Makes `name` resolvable by [`Application::configure`].
    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Application) -> Result<Box<dyn Middleware>> + Send + Sync + 'static,
    {
        self.registry.insert(name.to_owned(), Arc::new(factory));
        self
    }

    /// Appends the named interceptors. Nothing is added if any name is unknown
    /// or already configured.
    pub fn configure(&mut self, names: &[&str]) -> Result<&mut Self> {
        let mut factories = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if self.is_configured(name) || names[..i].contains(name) {
                return Err(Error::Configuration(format!(
                    "middleware {:?} configured twice",
                    name
                )));
            }
            let factory = self.registry.get(*name).cloned().ok_or_else(|| {
                Error::Configuration(format!("unknown middleware {:?}", name))
            })?;
            factories.push(factory);
        }

        let mut created = Vec::with_capacity(factories.len());
        for factory in factories {
            created.push(factory(self)?);
        }
        for layer in created {
            dev_print!("configured middleware {}", layer.name());
            self.middleware.push(layer);
        }
        Ok(self)
    }

    /// Appends an interceptor instance that is not looked up by name.
    pub fn use_middleware(&mut self, layer: Box<dyn Middleware>) -> &mut Self {
        self.middleware.push(layer);
        self
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.middleware.iter().any(|layer| layer.name() == name)
    }

    pub fn middleware_names(&self) -> Vec<&str> {
        self.middleware.iter().map(|layer| layer.name()).collect()
    }

    /// Composes the configured interceptors around `base`.
    pub fn build(&self, base: BoxHandler) -> Result<BoxHandler> {
        self.options.validate()?;
        Ok(middleware::build(&self.middleware, base, &self.options))
    }
}
