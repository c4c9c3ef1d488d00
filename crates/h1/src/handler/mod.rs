//! Request handlers.
//!
//! A [`Handler`] turns a request, whose body is still on the wire, into a [`Reply`]. It
//! runs on the connection's thread and may read as much or as little of the body as it
//! likes; the connection skips the rest afterwards.

use std::error::Error;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};

use crate::body::BodyStream;
use crate::protocol::{CloseAction, ConnectionContext};

pub trait Handler {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    fn call(&self, context: &ConnectionContext, request: Request<BodyStream<'_>>) -> Result<Reply, Self::Error>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    type Error = H::Error;

    fn call(&self, context: &ConnectionContext, request: Request<BodyStream<'_>>) -> Result<Reply, Self::Error> {
        (**self).call(context, request)
    }
}

/// A response together with what should happen to the connection after it is sent.
#[derive(Debug)]
pub struct Reply {
    response: Response<Bytes>,
    action: CloseAction,
}

impl Reply {
    pub fn new(response: Response<Bytes>) -> Self {
        Self { response, action: CloseAction::None }
    }

    /// Closes the connection once the response is written.
    #[must_use]
    pub fn close_connection(mut self) -> Self {
        self.action = CloseAction::Close;
        self
    }

    /// Resets the connection once the response is written.
    #[must_use]
    pub fn reset_connection(mut self) -> Self {
        self.action = CloseAction::Reset;
        self
    }

    pub fn action(&self) -> CloseAction {
        self.action
    }

    pub fn response(&self) -> &Response<Bytes> {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response<Bytes> {
        &mut self.response
    }

    pub fn into_parts(self) -> (Response<Bytes>, CloseAction) {
        (self.response, self.action)
    }
}

impl<B: Into<Bytes>> From<Response<B>> for Reply {
    fn from(response: Response<B>) -> Self {
        Self::new(response.map(Into::into))
    }
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, R, Err> Handler for HandlerFn<F>
where
    F: Fn(&ConnectionContext, Request<BodyStream<'_>>) -> Result<R, Err>,
    R: Into<Reply>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Error = Err;

    fn call(&self, context: &ConnectionContext, request: Request<BodyStream<'_>>) -> Result<Reply, Self::Error> {
        (self.f)(context, request).map(Into::into)
    }
}

pub fn make_handler<F, R, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(&ConnectionContext, Request<BodyStream<'_>>) -> Result<R, Err>,
    R: Into<Reply>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f }
}
