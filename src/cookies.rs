//! Generic cookie primitives: reading a named cookie from request headers and rendering
//! `Set-Cookie` headers onto a response.
//!
//! Parsing is deliberately small. Only the attributes this crate writes are understood when
//! reading a `Set-Cookie` header back.
use std::fmt;

use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Everything but `A-Z a-z 0-9 - _ . ~` is escaped in a query component.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// `Max-Age` used for long-lived preference cookies (366 days).
pub const MAX_AGE_ONE_YEAR: u32 = 31_622_400;

/// Settings shared by every cookie this crate writes.
///
/// `secure` should only be switched off for local development without TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    /// Mark written cookies `Secure`.
    pub secure: bool,
}

impl CookieSettings {
    /// Settings for local development: cookies are not marked `Secure`.
    pub fn insecure() -> Self {
        CookieSettings { secure: false }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        CookieSettings { secure: true }
    }
}

/// `SameSite` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Lifetime of a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAge {
    /// No `Max-Age`: the cookie lasts for the browser session.
    Session,
    /// `Max-Age=n`.
    Seconds(u32),
    /// `Max-Age=0`: delete the cookie now.
    Expire,
}

/// One `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub max_age: MaxAge,
    pub same_site: SameSite,
    pub http_only: bool,
    pub secure: bool,
}

impl SetCookie {
    /// A cookie on path `/` for `domain` with `SameSite=Lax`, no `HttpOnly`, and `Secure` as
    /// configured in `settings`.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
        settings: &CookieSettings,
    ) -> Self {
        SetCookie {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_owned(),
            max_age: MaxAge::Session,
            same_site: SameSite::Lax,
            http_only: false,
            secure: settings.secure,
        }
    }

    /// Render as a header value.
    pub fn to_header_value(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&self.to_string())
            .map_err(|_| Error::InvalidHeaderValue(self.name.clone()))
    }

    /// Parse a `Set-Cookie` header value. Attributes other than the ones rendered by
    /// [`SetCookie`] are ignored.
    pub fn parse(header: &str) -> Option<SetCookie> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = SetCookie {
            name: name.to_owned(),
            value: value.trim().to_owned(),
            domain: String::new(),
            path: String::new(),
            max_age: MaxAge::Session,
            same_site: SameSite::Lax,
            http_only: false,
            secure: false,
        };

        for part in parts.map(str::trim) {
            match part.split_once('=') {
                Some((k, v)) => match k.to_ascii_lowercase().as_str() {
                    "path" => cookie.path = v.to_owned(),
                    "domain" => cookie.domain = v.trim_start_matches('.').to_owned(),
                    "max-age" => {
                        cookie.max_age = match v.parse::<u32>() {
                            Ok(0) | Err(_) => MaxAge::Expire,
                            Ok(n) => MaxAge::Seconds(n),
                        }
                    }
                    "samesite" => {
                        cookie.same_site = if v.eq_ignore_ascii_case("strict") {
                            SameSite::Strict
                        } else if v.eq_ignore_ascii_case("none") {
                            SameSite::None
                        } else {
                            SameSite::Lax
                        }
                    }
                    _ => {}
                },
                None => {
                    if part.eq_ignore_ascii_case("secure") {
                        cookie.secure = true;
                    } else if part.eq_ignore_ascii_case("httponly") {
                        cookie.http_only = true;
                    }
                }
            }
        }

        Some(cookie)
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if !self.path.is_empty() {
            write!(f, "; Path={}", self.path)?;
        }
        if !self.domain.is_empty() {
            write!(f, "; Domain={}", self.domain)?;
        }
        match self.max_age {
            MaxAge::Session => {}
            MaxAge::Seconds(n) => write!(f, "; Max-Age={}", n)?,
            MaxAge::Expire => f.write_str("; Max-Age=0")?,
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        write!(f, "; SameSite={}", self.same_site.as_str())
    }
}

/// Read the raw value of cookie `name` from the request's `Cookie` headers.
///
/// Returns the first match. Surrounding double quotes are stripped; the value is not unescaped.
pub fn get(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| {
            let v = v.trim();
            v.strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(v)
                .to_owned()
        })
}

/// Like [`get`], but a missing cookie is [`Error::CookieNotFound`].
pub(crate) fn require(headers: &HeaderMap, name: &str) -> Result<String> {
    get(headers, name).ok_or_else(|| Error::CookieNotFound(name.to_owned()))
}

/// Query-escape `cookie.value` and append the cookie to the response headers.
pub fn set(headers: &mut HeaderMap, mut cookie: SetCookie) -> Result<()> {
    cookie.value = query_escape(&cookie.value);
    set_unencoded(headers, cookie)
}

/// Append the cookie to the response headers with its value written as-is.
pub fn set_unencoded(headers: &mut HeaderMap, cookie: SetCookie) -> Result<()> {
    headers.append(SET_COOKIE, cookie.to_header_value()?);
    Ok(())
}

/// Escape `value` so it can be placed in a cookie or query string. Spaces become `+`.
pub fn query_escape(value: &str) -> String {
    value
        .split(' ')
        .map(|part| utf8_percent_encode(part, QUERY_COMPONENT).to_string())
        .collect::<Vec<_>>()
        .join("+")
}

/// Reverse of [`query_escape`].
///
/// Strict: a `%` not followed by two hex digits, or a result that is not UTF-8, is
/// [`Error::InvalidEscape`].
pub fn query_unescape(value: &str) -> Result<String> {
    let invalid = || Error::InvalidEscape(value.to_owned());

    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let (hi, lo) = match bytes.get(i + 1..i + 3) {
                    Some(&[hi, lo]) => (hex_value(hi), hex_value(lo)),
                    _ => return Err(invalid()),
                };
                let (Some(hi), Some(lo)) = (hi, lo) else {
                    return Err(invalid());
                };
                out.push(hi << 4 | lo);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).map_err(|_| invalid())
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
