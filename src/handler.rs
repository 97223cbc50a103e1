//! Composition of the dispatch decision with the two downstream handlers.
use http::header::SET_COOKIE;
use http::{Request, Response};

use crate::{CookieTime, Decision, Dispatcher, Variant};

/// Something that turns a request into a response.
///
/// Implemented for plain functions and closures.
pub trait Handler<B, R> {
    /// Serve `request`.
    fn serve(&self, request: Request<B>) -> Response<R>;
}

impl<F, B, R> Handler<B, R> for F
where
    F: Fn(Request<B>) -> Response<R>,
{
    fn serve(&self, request: Request<B>) -> Response<R> {
        self(request)
    }
}

/// How an [`AbTestHandler`] treats requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerMode {
    /// The test is running: requests are split between the new and old handlers.
    Split,
    /// The test has finished: its cookie entry is removed and the new handler serves everything.
    Purge,
}

impl Decision {
    /// Serve `request` with the handler for this decision, adding the cookie update to the
    /// response.
    pub fn serve<B, R>(
        self,
        request: Request<B>,
        new: &impl Handler<B, R>,
        old: &impl Handler<B, R>,
    ) -> Response<R> {
        let mut response = match self.variant {
            Variant::New => new.serve(request),
            Variant::Old => old.serve(request),
        };
        if let Some(cookie) = self.set_cookie {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        response
    }
}

/// Routes each request to the `new` or `old` handler according to the client's cookie.
///
/// Build one with [`AbTestConfig::to_handler`](crate::AbTestConfig::to_handler).
pub struct AbTestHandler<N, O> {
    mode: HandlerMode,
    dispatcher: Dispatcher,
    new: N,
    old: O,
}

impl<N, O> AbTestHandler<N, O> {
    #[allow(missing_docs)]
    pub fn new(mode: HandlerMode, dispatcher: Dispatcher, new: N, old: O) -> Self {
        AbTestHandler {
            mode,
            dispatcher,
            new,
            old,
        }
    }

    /// Decision for `request` at `now`, without serving it.
    pub fn decide<B>(&self, request: &Request<B>, now: CookieTime) -> Decision {
        match self.mode {
            HandlerMode::Split => self.dispatcher.decide(request, now),
            HandlerMode::Purge => self.dispatcher.purge(request.headers()),
        }
    }
}

impl<N, O, B, R> Handler<B, R> for AbTestHandler<N, O>
where
    N: Handler<B, R>,
    O: Handler<B, R>,
{
    fn serve(&self, request: Request<B>) -> Response<R> {
        self.decide(&request, CookieTime::now())
            .serve(request, &self.new, &self.old)
    }
}
