//! Cookie-driven A/B rollout of HTTP request handlers.
//!
//! # Overview
//!
//! An [`AbTestHandler`] sits in front of two handlers, a replacement (`new`) and the existing one
//! (`old`), and routes every request to one of them. Each client is assigned a variant the first
//! time it is seen, and the assignment is stored in the client's own `ab_test` cookie, so no
//! server-side session is needed and the client keeps its variant for a day.
//!
//! All tests share the one cookie, which holds a JSON map from test id to [`AssignmentWindow`].
//! [`AbTestCodec`] reads and updates single entries in it without disturbing the others.
//!
//! Once a test is over, switch its handler to [`HandlerMode::Purge`]: it serves `new` to
//! everybody and strips the test's entry from cookies as clients come back.
//!
//! ```
//! use ab_cookies::{AbTestConfig, Handler};
//! use http::{Request, Response};
//!
//! let mut config = AbTestConfig::new("search", "example.com");
//! config.percentage(10).exit_param("exit-new-search");
//!
//! let handler = config.to_handler(
//!     |_req: Request<()>| Response::new("new search"),
//!     |_req: Request<()>| Response::new("old search"),
//! );
//! let response = handler.serve(Request::new(()));
//! assert!(response.headers().contains_key(http::header::SET_COOKIE));
//! ```
//!
//! The [`cookies`], [`tokens`] and [`policy`] modules hold the other, single-purpose cookies
//! the site uses.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. The A/B handlers never return them: a cookie
//! that cannot be read counts as no assignment, and a cookie that cannot be written only loses
//! that one assignment. Both are logged.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with target `ab_cookies`.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod codec;
mod config;
mod cookie_time;
pub mod cookies;
mod dispatch;
mod error;
mod handler;
pub mod policy;
mod randomiser;
pub mod tokens;

pub use codec::{AbTestCodec, AssignmentWindow, AB_TEST_COOKIE};
pub use config::AbTestConfig;
pub use cookie_time::CookieTime;
pub use cookies::{CookieSettings, SetCookie};
pub use dispatch::{Decision, DispatchState, Dispatcher, Variant};
pub use error::{Error, Result};
pub use handler::{AbTestHandler, Handler, HandlerMode};
pub use randomiser::{
    PercentageRandomiser, RandomSource, Randomiser, SeededRandomSource, ThreadRandomSource,
};
