use axum::http::{header, HeaderMap};

pub(crate) const REFRESH_COOKIE: &str = "refreshToken";

/// Builds an httpOnly SameSite=Lax cookie; `Secure` is appended only for
/// production so local HTTP development keeps working.
pub(crate) fn build_cookie(name: &str, value: &str, max_age_seconds: i64, secure: bool) -> String {
    let mut cookie =
        format!("{name}={value}; Max-Age={max_age_seconds}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub(crate) fn clear_cookie(name: &str, secure: bool) -> String {
    build_cookie(name, "", 0, secure)
}

pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?;
        if key == name {
            return parts.next().map(|value| value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_string_shape() {
        let cookie = build_cookie("refreshToken", "abc", 604800, false);
        assert_eq!(cookie, "refreshToken=abc; Max-Age=604800; Path=/; HttpOnly; SameSite=Lax");

        let cookie = build_cookie("refreshToken", "abc", 604800, true);
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_zeroes_max_age() {
        let cookie = clear_cookie("refreshToken", false);
        assert!(cookie.starts_with("refreshToken=; Max-Age=0"));
    }

    #[test]
    fn cookie_value_parses_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("a=1; refreshToken=tok.en.value; b=2"),
        );
        assert_eq!(cookie_value(&headers, "refreshToken").as_deref(), Some("tok.en.value"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }
}
