use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

pub const PRINCIPAL_ID_HEADER: &str = "x-ms-client-principal-id";
pub const PRINCIPAL_NAME_HEADER: &str = "x-ms-client-principal-name";

/// User id applied when the fronting auth proxy supplies no principal.
pub const SAMPLE_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Caller identity as reported by the authentication proxy in front of the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_principal_id: String,
    pub user_name: Option<String>,
}

impl AuthenticatedUser {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            user_principal_id: header(PRINCIPAL_ID_HEADER)
                .unwrap_or_else(|| SAMPLE_USER_ID.to_string()),
            user_name: header(PRINCIPAL_NAME_HEADER),
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_principal_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(PRINCIPAL_ID_HEADER, HeaderValue::from_static("user-7"));
        headers.insert(PRINCIPAL_NAME_HEADER, HeaderValue::from_static("ada@contoso.com"));

        let user = AuthenticatedUser::from_headers(&headers);
        assert_eq!(user.user_principal_id, "user-7");
        assert_eq!(user.user_name.as_deref(), Some("ada@contoso.com"));
    }

    #[test]
    fn missing_headers_fall_back_to_sample_user() {
        let user = AuthenticatedUser::from_headers(&HeaderMap::new());
        assert_eq!(user.user_principal_id, SAMPLE_USER_ID);
        assert!(user.user_name.is_none());
    }
}
