//! Session cookies
//!
//! Access and refresh tokens travel as two independent cookies:
//! `HttpOnly`, `SameSite=Strict`, `Path=/`, and `Secure` unless disabled in
//! configuration for plain-HTTP local development.

use actix_web::cookie::{time::Duration, Cookie, SameSite};

use crate::configuration::CookieSettings;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Cookie for a token that lives `max_age_seconds`
pub fn session_cookie(
    name: &'static str,
    value: String,
    max_age_seconds: i64,
    settings: &CookieSettings,
) -> Cookie<'static> {
    Cookie::build(name, value)
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(max_age_seconds))
        .finish()
}

/// Cookie that instructs the client to drop `name`
pub fn removal_cookie(name: &'static str, settings: &CookieSettings) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new(), 0, settings);
    cookie.make_removal();
    cookie
}
