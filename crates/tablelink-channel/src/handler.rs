use async_trait::async_trait;
use tablelink_wire::{Request, Response};

use crate::error::Result;

/// One link in a channel's request handler chain.
///
/// Return `Ok(Some(response))` to answer the request, `Ok(None)` to let the
/// next handler try.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: &Request) -> Result<Option<Response>>;
}

/// Adapts a synchronous closure into a [`RequestHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> RequestHandler for FnHandler<F>
where
    F: Fn(&Request) -> Result<Option<Response>> + Send + Sync,
{
    async fn handle(&self, request: &Request) -> Result<Option<Response>> {
        (self.0)(request)
    }
}

/// Wrap a closure as a shareable request handler.
pub fn handler_fn<F>(f: F) -> std::sync::Arc<dyn RequestHandler>
where
    F: Fn(&Request) -> Result<Option<Response>> + Send + Sync + 'static,
{
    std::sync::Arc::new(FnHandler(f))
}

/// Answers `hello` with `ack`. Installed first on every channel.
pub(crate) struct HelloHandler;

#[async_trait]
impl RequestHandler for HelloHandler {
    async fn handle(&self, request: &Request) -> Result<Option<Response>> {
        Ok(match request {
            Request::Hello(_) => Some(Response::ack()),
            _ => None,
        })
    }
}
