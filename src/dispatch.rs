//! Choosing the handler that serves a request.
//!
//! A client's [`AssignmentWindow`] for a test puts it in one of three states:
//!
//! - [`DispatchState::NewActive`]: `new` is after now. Serve the new handler.
//! - [`DispatchState::OldActive`]: `new` has passed but `old` is after now. Serve the old handler.
//! - [`DispatchState::Unassigned`]: neither is after now (or there is no entry). Draw a fresh
//!   window from the [`Randomiser`], persist it, and serve the variant it picked.
//!
//! If both ends are in the future the new variant wins. The randomiser never produces such a
//! window; it only shows up from edited cookies or clock skew.
//!
//! The exit parameter overrides all of this: its presence in the query string pins the client to
//! the old variant for a day.
use chrono::Duration;
use derive_more::Display;
use http::{HeaderMap, HeaderValue, Request, Uri};

use crate::{AbTestCodec, AssignmentWindow, CookieTime, Randomiser};

/// How long a fresh assignment sticks.
pub(crate) fn sticky_period() -> Duration {
    Duration::hours(24)
}

/// The two handlers under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Variant {
    /// The replacement handler being rolled out.
    #[display(fmt = "new")]
    New,
    /// The existing handler.
    #[display(fmt = "old")]
    Old,
}

/// Where a client stands for one test at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[allow(missing_docs)]
pub enum DispatchState {
    #[display(fmt = "new_active")]
    NewActive,
    #[display(fmt = "old_active")]
    OldActive,
    #[display(fmt = "unassigned")]
    Unassigned,
}

impl AssignmentWindow {
    /// Window that keeps `variant` active for a day from `now`, with the other variant expiring
    /// at `now`.
    pub fn favouring(variant: Variant, now: CookieTime) -> AssignmentWindow {
        let until = now.saturating_add(sticky_period());
        match variant {
            Variant::New => AssignmentWindow {
                new: Some(until),
                old: Some(now),
            },
            Variant::Old => AssignmentWindow {
                new: Some(now),
                old: Some(until),
            },
        }
    }

    /// State of this window at `now`.
    pub fn state(&self, now: CookieTime) -> DispatchState {
        let live = |t: &Option<CookieTime>| t.is_some_and(|t| t.is_after(&now));
        if live(&self.new) {
            DispatchState::NewActive
        } else if live(&self.old) {
            DispatchState::OldActive
        } else {
            DispatchState::Unassigned
        }
    }

    /// Variant this window selects at `now`, if any.
    pub fn active_variant(&self, now: CookieTime) -> Option<Variant> {
        match self.state(now) {
            DispatchState::NewActive => Some(Variant::New),
            DispatchState::OldActive => Some(Variant::Old),
            DispatchState::Unassigned => None,
        }
    }
}

/// Outcome of dispatching one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Handler that should serve the request.
    pub variant: Variant,
    /// `Set-Cookie` value to add to the response, if the cookie changed.
    pub set_cookie: Option<HeaderValue>,
}

/// Decides, per request, which variant of one A/B test serves it.
///
/// Holds no per-client state: everything is read from and written to the request's cookie.
pub struct Dispatcher {
    test_id: String,
    exit_param: Option<String>,
    codec: AbTestCodec,
    randomiser: Box<dyn Randomiser + Send + Sync>,
}

impl Dispatcher {
    /// Create a dispatcher for `test_id`.
    ///
    /// `exit_param` is the query parameter that pins a client to the old variant.
    pub fn new(
        test_id: impl Into<String>,
        exit_param: Option<String>,
        codec: AbTestCodec,
        randomiser: impl Randomiser + Send + Sync + 'static,
    ) -> Self {
        Dispatcher {
            test_id: test_id.into(),
            exit_param,
            codec,
            randomiser: Box::new(randomiser),
        }
    }

    /// Test this dispatcher serves.
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// Pick the variant for `request` at `now`.
    ///
    /// Never fails: an unreadable cookie counts as no assignment, and a cookie that cannot be
    /// written only means the assignment is not persisted.
    pub fn decide<B>(&self, request: &Request<B>, now: CookieTime) -> Decision {
        let headers = request.headers();

        if self.exit_requested(request.uri()) {
            log::debug!(target: "ab_cookies", test_id:display = self.test_id; "exiting a/b test");
            return Decision {
                variant: Variant::Old,
                set_cookie: self.persist(headers, AssignmentWindow::favouring(Variant::Old, now)),
            };
        }

        let window = self
            .codec
            .get(headers, &self.test_id)
            .unwrap_or_else(|err| {
                log::warn!(target: "ab_cookies", test_id:display = self.test_id;
                           "error getting a/b test assignment: {:?}", err);
                AssignmentWindow::default()
            });

        let state = window.state(now);
        log::trace!(target: "ab_cookies",
                    test_id:display = self.test_id,
                    state:display = state;
                    "dispatching a/b test request");

        match state {
            DispatchState::NewActive => Decision {
                variant: Variant::New,
                set_cookie: None,
            },
            DispatchState::OldActive => Decision {
                variant: Variant::Old,
                set_cookie: None,
            },
            DispatchState::Unassigned => self.assign(headers, now),
        }
    }

    /// Remove this test from the cookie and serve the new variant.
    pub fn purge(&self, headers: &HeaderMap) -> Decision {
        let set_cookie = self
            .codec
            .remove(headers, &self.test_id)
            .unwrap_or_else(|err| {
                log::warn!(target: "ab_cookies", test_id:display = self.test_id;
                           "error removing a/b test assignment: {:?}", err);
                None
            });

        if set_cookie.is_some() {
            log::debug!(target: "ab_cookies", test_id:display = self.test_id;
                        "purged a/b test assignment");
        }

        Decision {
            variant: Variant::New,
            set_cookie,
        }
    }

    fn assign(&self, headers: &HeaderMap, now: CookieTime) -> Decision {
        let window = self.randomiser.assign(now);
        let variant = window.active_variant(now).unwrap_or_else(|| {
            log::warn!(target: "ab_cookies", test_id:display = self.test_id;
                       "randomiser produced an expired window, serving old");
            Variant::Old
        });

        log::debug!(target: "ab_cookies",
                    test_id:display = self.test_id,
                    variant:display = variant;
                    "assigned a/b test variant");

        Decision {
            variant,
            set_cookie: self.persist(headers, window),
        }
    }

    fn persist(&self, headers: &HeaderMap, window: AssignmentWindow) -> Option<HeaderValue> {
        self.codec
            .set(headers, &self.test_id, window)
            .inspect_err(|err| {
                log::warn!(target: "ab_cookies", test_id:display = self.test_id;
                           "error updating a/b test cookie: {:?}", err);
            })
            .ok()
    }

    fn exit_requested(&self, uri: &Uri) -> bool {
        let (Some(param), Some(query)) = (self.exit_param.as_deref(), uri.query()) else {
            return false;
        };
        url::form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == param)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use http::header::COOKIE;
    use http::{HeaderValue, Request};

    use super::*;
    use crate::codec::{AbTestCookie, AB_TEST_COOKIE};
    use crate::cookies::{query_escape, CookieSettings, SetCookie};
    use crate::PercentageRandomiser;

    const TEST_ID: &str = "test-aspect";
    const EXIT: &str = "exit-new-test";

    fn now() -> CookieTime {
        CookieTime::parse("2022-03-01T12:00:00").unwrap()
    }

    fn dispatcher(randomiser: impl Randomiser + Send + Sync + 'static) -> Dispatcher {
        Dispatcher::new(
            TEST_ID,
            Some(EXIT.to_owned()),
            AbTestCodec::new("test-domain", CookieSettings::default()),
            randomiser,
        )
    }

    fn request(uri: &str, window: Option<AssignmentWindow>) -> Request<()> {
        let mut builder = Request::builder().uri(uri);
        if let Some(window) = window {
            let cookie = AbTestCookie::default()
                .with_entry(TEST_ID, window)
                .unwrap()
                .encode()
                .unwrap();
            builder = builder.header(COOKIE, format!("{}={}", AB_TEST_COOKIE, cookie));
        }
        builder.body(()).unwrap()
    }

    fn stored_window(value: &HeaderValue) -> AssignmentWindow {
        let cookie = SetCookie::parse(value.to_str().unwrap()).unwrap();
        let mut headers = http::HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{}={}", cookie.name, cookie.value)).unwrap(),
        );
        AbTestCodec::new("", CookieSettings::default())
            .get(&headers, TEST_ID)
            .unwrap()
    }

    fn never_called() -> impl Randomiser + Send + Sync + 'static {
        |_now: CookieTime| -> AssignmentWindow { panic!("randomiser should not be called") }
    }

    #[test]
    fn window_states() {
        let now = now();
        let later = now.saturating_add(sticky_period());
        let earlier = now.saturating_add(-sticky_period());

        let window = |new, old| AssignmentWindow { new, old };
        assert_eq!(window(Some(later), None).state(now), DispatchState::NewActive);
        assert_eq!(window(Some(later), Some(now)).state(now), DispatchState::NewActive);
        // new wins when both are live
        assert_eq!(window(Some(later), Some(later)).state(now), DispatchState::NewActive);
        assert_eq!(window(None, Some(later)).state(now), DispatchState::OldActive);
        assert_eq!(window(Some(now), Some(later)).state(now), DispatchState::OldActive);
        assert_eq!(window(Some(earlier), Some(later)).state(now), DispatchState::OldActive);
        assert_eq!(window(Some(now), Some(now)).state(now), DispatchState::Unassigned);
        assert_eq!(window(Some(earlier), Some(earlier)).state(now), DispatchState::Unassigned);
        assert_eq!(AssignmentWindow::default().state(now), DispatchState::Unassigned);
    }

    #[test]
    fn live_new_window_serves_new_without_writing() {
        let window = AssignmentWindow::favouring(Variant::New, now());
        let decision = dispatcher(never_called()).decide(&request("/", Some(window)), now());
        assert_eq!(
            decision,
            Decision {
                variant: Variant::New,
                set_cookie: None
            }
        );
    }

    #[test]
    fn live_old_window_serves_old_without_writing() {
        let window = AssignmentWindow::favouring(Variant::Old, now());
        let decision = dispatcher(never_called()).decide(&request("/", Some(window)), now());
        assert_eq!(
            decision,
            Decision {
                variant: Variant::Old,
                set_cookie: None
            }
        );
    }

    #[test]
    fn unassigned_client_gets_fresh_assignment_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let randomiser = {
            let calls = calls.clone();
            move |now: CookieTime| {
                calls.fetch_add(1, Ordering::SeqCst);
                AssignmentWindow::favouring(Variant::New, now)
            }
        };
        let dispatcher = dispatcher(randomiser);

        let decision = dispatcher.decide(&request("/", None), now());
        assert_eq!(decision.variant, Variant::New);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stored = stored_window(decision.set_cookie.as_ref().unwrap());
        assert_eq!(stored, AssignmentWindow::favouring(Variant::New, now()));

        // replaying the stored window at the same time is sticky and draws nothing
        let replay = dispatcher.decide(&request("/", Some(stored)), now());
        assert_eq!(replay.variant, Variant::New);
        assert_eq!(replay.set_cookie, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_window_is_reassigned() {
        let expired = AssignmentWindow::favouring(Variant::New, now());
        let tomorrow = now().saturating_add(sticky_period());
        let decision = dispatcher(PercentageRandomiser::new(0))
            .decide(&request("/", Some(expired)), tomorrow);

        assert_eq!(decision.variant, Variant::Old);
        assert_eq!(
            stored_window(decision.set_cookie.as_ref().unwrap()),
            AssignmentWindow::favouring(Variant::Old, tomorrow)
        );
    }

    #[test]
    fn undecodable_cookie_is_treated_as_missing() {
        let request = Request::builder()
            .uri("/")
            .header(COOKIE, "ab_test=%zz")
            .body(())
            .unwrap();
        let decision = dispatcher(PercentageRandomiser::new(100)).decide(&request, now());
        assert_eq!(decision.variant, Variant::New);
        assert!(decision.set_cookie.is_some());
    }

    #[test]
    fn exit_parameter_pins_old() {
        let window = AssignmentWindow::favouring(Variant::New, now());
        for uri in ["/?exit-new-test", "/?exit-new-test=", "/?a=1&exit-new-test=yes"] {
            let decision = dispatcher(never_called()).decide(&request(uri, Some(window)), now());
            assert_eq!(decision.variant, Variant::Old, "{uri}");
            assert_eq!(
                stored_window(decision.set_cookie.as_ref().unwrap()),
                AssignmentWindow {
                    new: Some(now()),
                    old: Some(now().saturating_add(sticky_period())),
                }
            );
        }
    }

    #[test]
    fn other_parameters_do_not_exit() {
        let window = AssignmentWindow::favouring(Variant::New, now());
        let decision = dispatcher(never_called())
            .decide(&request("/?exit-new=1", Some(window)), now());
        assert_eq!(decision.variant, Variant::New);
    }

    #[test]
    fn purge_removes_entry_and_serves_new() {
        let window = AssignmentWindow::favouring(Variant::Old, now());
        let decision = dispatcher(never_called()).purge(request("/", Some(window)).headers());
        assert_eq!(decision.variant, Variant::New);

        let cookie = SetCookie::parse(decision.set_cookie.unwrap().to_str().unwrap()).unwrap();
        assert_eq!(cookie.value, query_escape("{}"));
    }

    #[test]
    fn purge_without_entry_writes_nothing() {
        let decision = dispatcher(never_called()).purge(request("/", None).headers());
        assert_eq!(
            decision,
            Decision {
                variant: Variant::New,
                set_cookie: None
            }
        );
    }
}
