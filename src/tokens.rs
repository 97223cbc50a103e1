//! Single-purpose cookies: locale, collection and the auth tokens.
use http::HeaderMap;

use crate::cookies::{self, CookieSettings, MaxAge, SameSite, SetCookie, MAX_AGE_ONE_YEAR};
use crate::Result;

/// User-selected language of the website.
pub const LOCALE_COOKIE: &str = "lang";
/// Currently active collection.
pub const COLLECTION_COOKIE: &str = "collection";
/// User's access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
/// User's id token.
pub const ID_TOKEN_COOKIE: &str = "id_token";
/// User's refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

const REFRESH_TOKEN_PATH: &str = "/api/v1/tokens/self";

/// Set the locale cookie. It lasts a year.
pub fn set_lang(
    headers: &mut HeaderMap,
    lang: &str,
    domain: &str,
    settings: &CookieSettings,
) -> Result<()> {
    let mut cookie = SetCookie::new(LOCALE_COOKIE, lang, domain, settings);
    cookie.max_age = MaxAge::Seconds(MAX_AGE_ONE_YEAR);
    cookies::set(headers, cookie)
}

/// Read the locale cookie.
pub fn get_lang(headers: &HeaderMap) -> Result<String> {
    cookies::require(headers, LOCALE_COOKIE)
}

/// Set the collection cookie for the browser session.
pub fn set_collection(
    headers: &mut HeaderMap,
    collection_id: &str,
    domain: &str,
    settings: &CookieSettings,
) -> Result<()> {
    cookies::set(
        headers,
        SetCookie::new(COLLECTION_COOKIE, collection_id, domain, settings),
    )
}

/// Read the collection cookie.
pub fn get_collection(headers: &HeaderMap) -> Result<String> {
    cookies::require(headers, COLLECTION_COOKIE)
}

/// Set the access token cookie for the browser session.
pub fn set_user_auth_token(
    headers: &mut HeaderMap,
    token: &str,
    domain: &str,
    settings: &CookieSettings,
) -> Result<()> {
    cookies::set(
        headers,
        SetCookie::new(ACCESS_TOKEN_COOKIE, token, domain, settings),
    )
}

/// Read the access token cookie.
pub fn get_user_auth_token(headers: &HeaderMap) -> Result<String> {
    cookies::require(headers, ACCESS_TOKEN_COOKIE)
}

/// Set the id token cookie for the browser session.
pub fn set_id_token(
    headers: &mut HeaderMap,
    token: &str,
    domain: &str,
    settings: &CookieSettings,
) -> Result<()> {
    cookies::set(headers, SetCookie::new(ID_TOKEN_COOKIE, token, domain, settings))
}

/// Read the id token cookie.
pub fn get_id_token(headers: &HeaderMap) -> Result<String> {
    cookies::require(headers, ID_TOKEN_COOKIE)
}

/// Set the refresh token cookie. It is scoped to the token refresh endpoint, `HttpOnly` and
/// `SameSite=Strict`.
pub fn set_refresh_token(
    headers: &mut HeaderMap,
    token: &str,
    domain: &str,
    settings: &CookieSettings,
) -> Result<()> {
    let mut cookie = SetCookie::new(REFRESH_TOKEN_COOKIE, token, domain, settings);
    cookie.path = REFRESH_TOKEN_PATH.to_owned();
    cookie.same_site = SameSite::Strict;
    cookie.http_only = true;
    cookies::set(headers, cookie)
}

/// Read the refresh token cookie.
pub fn get_refresh_token(headers: &HeaderMap) -> Result<String> {
    cookies::require(headers, REFRESH_TOKEN_COOKIE)
}
