//! Authenticated session state and the header parsing that produces it.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, COOKIE, REFERER, SET_COOKIE, USER_AGENT,
};
use secrecy::{ExposeSecret, SecretString};

/// Name of the only cookie the site needs for authentication.
pub const SESSION_COOKIE: &str = "_yatri_session";

pub const CSRF_HEADER: &str = "x-csrf-token";

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36";

/// Login credentials. The password never shows up in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::new(password.into()),
        }
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Cookie jar reduced to the one cookie the site authenticates with.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie(String);

impl SessionCookie {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Find the session cookie among all `Set-Cookie` headers of a response.
    ///
    /// Attributes (path, expiry, flags) and every other cookie are dropped.
    /// When the header appears more than once the last value wins, matching
    /// how a browser would overwrite it.
    pub fn from_set_cookie(headers: &HeaderMap) -> Option<Self> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|raw| cookie::Cookie::parse(raw).ok())
            .filter(|c| c.name() == SESSION_COOKIE && !c.value().is_empty())
            .map(|c| SessionCookie(c.value().to_string()))
            .last()
    }

    /// Value for a `Cookie` request header.
    pub fn header_value(&self) -> String {
        cookie::Cookie::new(SESSION_COOKIE, self.0.as_str()).to_string()
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionCookie([redacted; {} bytes])", self.0.len())
    }
}

static CSRF_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<meta\s+[^>]*name\s*=\s*["']csrf-token["'][^>]*>"#).expect("valid regex")
});

static CONTENT_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"content\s*=\s*["']([^"']*)["']"#).expect("valid regex"));

/// Extract the anti-forgery token from `<meta name="csrf-token" content="...">`.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let tag = CSRF_META.find(html)?;
    let token = CONTENT_ATTR.captures(tag.as_str())?.get(1)?.as_str();
    if token.is_empty() {
        None
    } else {
        Some(decode_entities(token))
    }
}

// Rails escapes tokens with HTML entities inside attributes
fn decode_entities(raw: &str) -> String {
    raw.replace("&#43;", "+")
        .replace("&#x2B;", "+")
        .replace("&#47;", "/")
        .replace("&#x2F;", "/")
        .replace("&#61;", "=")
        .replace("&#x3D;", "=")
        .replace("&amp;", "&")
}

/// An authenticated session.
///
/// Produced by `login` and never mutated afterwards; re-authentication builds
/// a new one.
#[derive(Clone)]
pub struct Session {
    cookie: SessionCookie,
    csrf_token: String,
    referer: String,
}

impl Session {
    pub fn new(cookie: SessionCookie, csrf_token: impl Into<String>, referer: impl Into<String>) -> Self {
        Self {
            cookie,
            csrf_token: csrf_token.into(),
            referer: referer.into(),
        }
    }

    pub fn cookie(&self) -> &SessionCookie {
        &self.cookie
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// A copy of this session carrying a fresh anti-forgery token.
    ///
    /// The session cookie is kept as is; form pages may hand out a new one
    /// but the authenticated cookie is the one the submission must carry.
    pub fn with_token(&self, csrf_token: String) -> Self {
        Self {
            cookie: self.cookie.clone(),
            csrf_token,
            referer: self.referer.clone(),
        }
    }

    /// Headers sent with every authenticated request.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(
            "referrer-policy",
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
        if let Ok(value) = HeaderValue::from_str(&self.cookie.header_value()) {
            headers.insert(COOKIE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.csrf_token) {
            headers.insert(CSRF_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.referer) {
            headers.insert(REFERER, value);
        }
        headers
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookie", &self.cookie)
            .field("csrf_token", &"[redacted]")
            .field("referer", &self.referer)
            .finish()
    }
}
