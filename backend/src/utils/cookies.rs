use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub secure: bool,
    pub same_site: SameSite,
}

impl From<&Config> for CookieOptions {
    fn from(config: &Config) -> Self {
        Self {
            secure: config.cookie_secure,
            same_site: config.cookie_same_site,
        }
    }
}

pub const SESSION_COOKIE_NAME: &str = "meshrealm_session";
pub const SESSION_COOKIE_PATH: &str = "/";

pub fn build_session_cookie(value: &str, max_age: Duration, options: CookieOptions) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite={}",
        SESSION_COOKIE_NAME,
        value,
        SESSION_COOKIE_PATH,
        max_age.as_secs(),
        same_site_value(options.same_site)
    );
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn build_clear_session_cookie(options: CookieOptions) -> String {
    let mut cookie = format!(
        "{}=; Path={}; Max-Age=0; HttpOnly; SameSite={}",
        SESSION_COOKIE_NAME,
        SESSION_COOKIE_PATH,
        same_site_value(options.same_site)
    );
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn extract_cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key == name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

fn same_site_value(same_site: SameSite) -> &'static str {
    match same_site {
        SameSite::Lax => "Lax",
        SameSite::Strict => "Strict",
        SameSite::None => "None",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_includes_security_attributes() {
        let opts = CookieOptions {
            secure: true,
            same_site: SameSite::Lax,
        };
        let cookie = build_session_cookie("abc", Duration::from_secs(3600), opts);
        assert!(cookie.starts_with("meshrealm_session=abc"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn clear_cookie_sets_max_age_zero() {
        let opts = CookieOptions {
            secure: false,
            same_site: SameSite::Strict,
        };
        let cookie = build_clear_session_cookie(opts);
        assert!(cookie.contains("meshrealm_session=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn extract_cookie_value_finds_matching_name() {
        let header = "a=1; meshrealm_session=token-value; b=2";
        assert_eq!(
            extract_cookie_value(header, SESSION_COOKIE_NAME).as_deref(),
            Some("token-value")
        );
        assert!(extract_cookie_value(header, "missing").is_none());
        assert!(extract_cookie_value("meshrealm_session=", SESSION_COOKIE_NAME).is_none());
    }
}
