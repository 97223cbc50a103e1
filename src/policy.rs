//! Cookie-consent policy cookies.
//!
//! Two generations of the policy live side by side: [`Policy`] (query-escaped JSON) and
//! [`OnsPolicy`], which is written as JSON with single quotes and no escaping so client-side
//! scripts can read it directly.
use http::HeaderMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::cookies::{self, CookieSettings, MaxAge, SetCookie, MAX_AGE_ONE_YEAR};
use crate::{Error, Result};

/// Cookie holding the [`Policy`].
pub const POLICY_COOKIE: &str = "cookies_policy";
/// Cookie set once the user has chosen their [`Policy`].
pub const PREFERENCES_SET_COOKIE: &str = "cookies_preferences_set";
/// Cookie holding the [`OnsPolicy`].
pub const ONS_POLICY_COOKIE: &str = "ons_cookie_policy";
/// Cookie set once the user has chosen their [`OnsPolicy`].
pub const ONS_PREFERENCES_SET_COOKIE: &str = "ons_cookie_message_displayed";

/// Cookie policy chosen by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Policy {
    pub essential: bool,
    pub usage: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            essential: true,
            usage: false,
        }
    }
}

/// Extended cookie policy chosen by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct OnsPolicy {
    pub essential: bool,
    pub settings: bool,
    pub usage: bool,
    pub campaigns: bool,
}

impl Default for OnsPolicy {
    fn default() -> Self {
        OnsPolicy {
            essential: true,
            settings: false,
            usage: false,
            campaigns: false,
        }
    }
}

/// The user's policy, and whether they have actually made a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preferences<P> {
    /// `true` once the user has chosen; until then `policy` is the default.
    pub is_preference_set: bool,
    #[allow(missing_docs)]
    pub policy: P,
}

/// Read [`Policy`] preferences.
pub fn get_cookie_preferences(headers: &HeaderMap) -> Preferences<Policy> {
    Preferences {
        is_preference_set: is_preference_set(headers, PREFERENCES_SET_COOKIE),
        policy: read_policy(headers, POLICY_COOKIE, |s| s).unwrap_or_default(),
    }
}

/// Read [`OnsPolicy`] preferences.
pub fn get_ons_cookie_preferences(headers: &HeaderMap) -> Preferences<OnsPolicy> {
    Preferences {
        is_preference_set: is_preference_set(headers, ONS_PREFERENCES_SET_COOKIE),
        policy: read_policy(headers, ONS_POLICY_COOKIE, |s| s.replace('\'', "\""))
            .unwrap_or_default(),
    }
}

/// Record that the user has chosen a [`Policy`].
pub fn set_preference_is_set(
    headers: &mut HeaderMap,
    domain: &str,
    settings: &CookieSettings,
) -> Result<()> {
    cookies::set(
        headers,
        long_lived(PREFERENCES_SET_COOKIE, "true".to_owned(), domain, settings),
    )
}

/// Record that the user has chosen an [`OnsPolicy`].
pub fn set_ons_preference_is_set(
    headers: &mut HeaderMap,
    domain: &str,
    settings: &CookieSettings,
) -> Result<()> {
    cookies::set(
        headers,
        long_lived(ONS_PREFERENCES_SET_COOKIE, "true".to_owned(), domain, settings),
    )
}

/// Store the user's [`Policy`].
pub fn set_policy(
    headers: &mut HeaderMap,
    policy: &Policy,
    domain: &str,
    settings: &CookieSettings,
) -> Result<()> {
    let json = serde_json::to_string(policy).map_err(|err| Error::Serialize(err.into()))?;
    cookies::set(headers, long_lived(POLICY_COOKIE, json, domain, settings))
}

/// Store the user's [`OnsPolicy`] as single-quoted, unescaped JSON.
pub fn set_ons_policy(
    headers: &mut HeaderMap,
    policy: &OnsPolicy,
    domain: &str,
    settings: &CookieSettings,
) -> Result<()> {
    let json = serde_json::to_string(policy).map_err(|err| Error::Serialize(err.into()))?;
    cookies::set_unencoded(
        headers,
        long_lived(ONS_POLICY_COOKIE, json.replace('"', "'"), domain, settings),
    )
}

fn long_lived(name: &str, value: String, domain: &str, settings: &CookieSettings) -> SetCookie {
    let mut cookie = SetCookie::new(name, value, domain, settings);
    cookie.max_age = MaxAge::Seconds(MAX_AGE_ONE_YEAR);
    cookie
}

fn is_preference_set(headers: &HeaderMap, name: &str) -> bool {
    cookies::get(headers, name).is_some_and(|v| v.parse::<bool>().unwrap_or(false))
}

fn read_policy<P: DeserializeOwned>(
    headers: &HeaderMap,
    name: &str,
    normalize: impl FnOnce(String) -> String,
) -> Option<P> {
    let raw = cookies::get(headers, name)?;
    let unescaped = cookies::query_unescape(&raw).ok()?;
    serde_json::from_str(&normalize(unescaped)).ok()
}
