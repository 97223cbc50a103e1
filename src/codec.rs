//! Encoding of A/B test assignments into the single shared `ab_test` cookie.
//!
//! The cookie value is a query-escaped JSON object mapping test ids to assignment windows:
//!
//! ```text
//! {"search":{"new":"2021-12-31T09:30:00","old":"2022-01-01T09:30:00"},"nav":{...}}
//! ```
//!
//! Every update decodes the whole map, produces a new map with one entry replaced or removed,
//! and re-encodes it. Entries are written in key order and untouched entries keep their exact
//! JSON, so an unmodified cookie re-encodes to the same bytes.
use std::collections::BTreeMap;

use derive_more::From;
use http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::value::{to_raw_value, RawValue};

use crate::cookie_time::{self, CookieTime};
use crate::cookies::{self, CookieSettings, MaxAge, SetCookie, MAX_AGE_ONE_YEAR};
use crate::{Error, Result};

/// Name of the cookie shared by all A/B tests.
pub const AB_TEST_COOKIE: &str = "ab_test";

/// The pair of expiry times that decides which variant a client sees for one test.
///
/// While `now < new` the new variant is active; otherwise while `now < old` the old variant is
/// active; otherwise the window has expired. `None` means unset, and the default window (both
/// unset) is what a client with no entry has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentWindow {
    /// The new variant is active until this time.
    #[serde(
        default,
        with = "cookie_time::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub new: Option<CookieTime>,
    /// The old variant is active until this time, once `new` has passed.
    #[serde(
        default,
        with = "cookie_time::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub old: Option<CookieTime>,
}

/// Decoded content of the `ab_test` cookie.
///
/// Entries are held as the raw JSON they were read from and only parsed on lookup. One entry
/// failing to parse does not fail the whole cookie, and entries that are not touched are written
/// back byte for byte.
#[derive(Debug, Clone, Default, Serialize, Deserialize, From)]
#[serde(transparent)]
pub(crate) struct AbTestCookie(BTreeMap<String, Box<RawValue>>);

impl AbTestCookie {
    /// Read the cookie from request headers. `Ok(None)` if it is not there.
    pub(crate) fn from_headers(headers: &HeaderMap) -> Result<Option<AbTestCookie>> {
        cookies::get(headers, AB_TEST_COOKIE)
            .map(|raw| AbTestCookie::decode(&raw))
            .transpose()
    }

    pub(crate) fn decode(raw: &str) -> Result<AbTestCookie> {
        let json = cookies::query_unescape(raw)?;
        serde_json::from_str(&json).map_err(|err| Error::InvalidJson(err.into()))
    }

    pub(crate) fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(self).map_err(|err| Error::Serialize(err.into()))?;
        Ok(cookies::query_escape(&json))
    }

    fn get(&self, test_id: &str) -> Result<AssignmentWindow> {
        let Some(raw) = self.0.get(test_id) else {
            return Ok(AssignmentWindow::default());
        };
        serde_json::from_str(raw.get()).map_err(|err| {
            log::debug!(target: "ab_cookies", test_id; "unparsable a/b test entry: {}", err);
            Error::InvalidAssignment {
                test_id: test_id.to_owned(),
            }
        })
    }

    pub(crate) fn with_entry(
        &self,
        test_id: &str,
        window: AssignmentWindow,
    ) -> Result<AbTestCookie> {
        let raw = to_raw_value(&window).map_err(|err| Error::Serialize(err.into()))?;
        let mut entries = self.0.clone();
        entries.insert(test_id.to_owned(), raw);
        Ok(AbTestCookie(entries))
    }

    /// `None` if there is no entry for `test_id`.
    fn without_entry(&self, test_id: &str) -> Option<AbTestCookie> {
        if !self.0.contains_key(test_id) {
            return None;
        }
        let mut entries = self.0.clone();
        entries.remove(test_id);
        Some(AbTestCookie(entries))
    }
}

/// Reads and writes assignment windows in the `ab_test` cookie for one cookie domain.
#[derive(Debug, Clone)]
pub struct AbTestCodec {
    domain: String,
    settings: CookieSettings,
}

impl AbTestCodec {
    /// Create a codec writing cookies for `domain`.
    pub fn new(domain: impl Into<String>, settings: CookieSettings) -> Self {
        AbTestCodec {
            domain: domain.into(),
            settings,
        }
    }

    /// Assignment window for `test_id` on this request.
    ///
    /// A missing cookie or a missing entry is the default (unset) window, not an error. An error
    /// means the cookie is present but could not be decoded.
    pub fn get(&self, headers: &HeaderMap, test_id: &str) -> Result<AssignmentWindow> {
        match AbTestCookie::from_headers(headers)? {
            Some(cookie) => cookie.get(test_id),
            None => {
                log::debug!(target: "ab_cookies", test_id; "a/b test cookie not found");
                Ok(AssignmentWindow::default())
            }
        }
    }

    /// `Set-Cookie` value storing `window` for `test_id`, keeping every other entry.
    ///
    /// A cookie that cannot be decoded is replaced by one holding only this entry.
    pub fn set(
        &self,
        headers: &HeaderMap,
        test_id: &str,
        window: AssignmentWindow,
    ) -> Result<HeaderValue> {
        let current = AbTestCookie::from_headers(headers)
            .unwrap_or_else(|err| {
                log::warn!(target: "ab_cookies", test_id;
                           "replacing undecodable a/b test cookie: {:?}", err);
                None
            })
            .unwrap_or_default();

        self.to_header_value(&current.with_entry(test_id, window)?)
    }

    /// `Set-Cookie` value with the entry for `test_id` removed.
    ///
    /// `Ok(None)` when there is nothing to remove: the cookie or the entry is absent, and no
    /// cookie should be written.
    pub fn remove(&self, headers: &HeaderMap, test_id: &str) -> Result<Option<HeaderValue>> {
        let Some(current) = AbTestCookie::from_headers(headers)? else {
            return Ok(None);
        };
        current
            .without_entry(test_id)
            .map(|cookie| self.to_header_value(&cookie))
            .transpose()
    }

    fn to_header_value(&self, cookie: &AbTestCookie) -> Result<HeaderValue> {
        let mut set_cookie = SetCookie::new(
            AB_TEST_COOKIE,
            cookie.encode()?,
            &*self.domain,
            &self.settings,
        );
        set_cookie.max_age = MaxAge::Seconds(MAX_AGE_ONE_YEAR);
        set_cookie.to_header_value()
    }
}
