use {
    axum::http::{HeaderMap, header::AUTHORIZATION},
    secrecy::ExposeSecret,
    wabridge_config::ApiConfig,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

/// A fresh 32-character API token.
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Token presented by a request: the `token` query parameter, else a
/// bearer `Authorization` header.
pub fn presented_token(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query_token.filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

// ── Auth logic ───────────────────────────────────────────────────────────────

/// Whether `presented` grants access to the client described by `config`.
/// A client without a token accepts every request.
pub fn authorize(config: &ApiConfig, presented: Option<&str>) -> bool {
    if !config.requires_token() {
        return true;
    }
    presented.is_some_and(|given| safe_equal(given, config.token.expose_secret()))
}

#[cfg(test)]
mod tests {
    use {super::*, axum::http::HeaderValue};

    #[test]
    fn safe_equal_compares_content() {
        assert!(safe_equal("abc", "abc"));
        assert!(!safe_equal("abc", "abd"));
        assert!(!safe_equal("abc", "abcd"));
    }

    #[test]
    fn query_token_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(
            presented_token(Some("from-query"), &headers).as_deref(),
            Some("from-query")
        );
        assert_eq!(
            presented_token(None, &headers).as_deref(),
            Some("from-header")
        );
        assert_eq!(presented_token(Some(""), &HeaderMap::new()), None);
    }

    #[test]
    fn tokenless_client_is_open() {
        let open = ApiConfig::new("admin", "");
        assert!(authorize(&open, None));

        let locked = ApiConfig::new("admin", "secret");
        assert!(!authorize(&locked, None));
        assert!(!authorize(&locked, Some("wrong")));
        assert!(authorize(&locked, Some("secret")));
    }

    #[test]
    fn generated_tokens_are_unique() {
        let a = generate_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, generate_token());
    }
}
