//! Custom Axum extractors

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiError;
use super::server::AppState;
use crate::auth::{AuthError, SESSION_HEADER};
use crate::db::repos::SessionRepo;
use crate::models::ValidationError;

/// Caller identity, resolved from the bearer token and its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or(AuthError::MissingToken)?;
        let session_header = session_header(parts)?;
        authenticate(state, token, session_header).await
    }
}

/// Like [`AuthUser`], but also accepts `?token=` because browsers cannot
/// set headers on an `EventSource`.
#[derive(Debug, Clone, Copy)]
pub struct StreamAuthUser(pub AuthUser);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl FromRequestParts<Arc<AppState>> for StreamAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session_header = session_header(parts)?;
        if let Some(token) = bearer_token(parts)? {
            return Ok(Self(authenticate(state, token, session_header).await?));
        }

        let Query(query): Query<TokenQuery> = Query::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::from(AuthError::MissingToken))?;
        let token = query.token.ok_or(AuthError::MissingToken)?;
        Ok(Self(authenticate(state, &token, session_header).await?))
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidToken("authorization header is not ASCII".into()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(Some(token.trim()))
        }
        _ => Err(AuthError::InvalidToken("expected a Bearer token".into())),
    }
}

fn session_header(parts: &Parts) -> Result<Option<Uuid>, AuthError> {
    parts
        .headers
        .get(SESSION_HEADER)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .ok_or(AuthError::SessionMismatch)
        })
        .transpose()
}

/// Verify a token, check it against the session header, then confirm the
/// session is still active.
async fn authenticate(
    state: &AppState,
    token: &str,
    session_header: Option<Uuid>,
) -> Result<AuthUser, ApiError> {
    let claims = state.tokens.verify(token)?;

    if let Some(sid) = session_header {
        if sid != claims.sid {
            return Err(AuthError::SessionMismatch.into());
        }
    }

    let active = SessionRepo::new(&state.pool)
        .is_active(claims.sid, claims.sub)
        .await?;
    if !active {
        return Err(AuthError::SessionInactive.into());
    }

    Ok(AuthUser {
        user_id: claims.sub,
        session_id: claims.sid,
    })
}

/// Extract and validate a UUID from path
pub struct ValidUuid(pub Uuid);

impl<S> FromRequestParts<S> for ValidUuid
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "id" }))?;

        let uuid = Uuid::parse_str(&id).map_err(|_| {
            ApiError::Validation(ValidationError::InvalidFormat {
                field: "id",
                reason: "invalid UUID format",
            })
        })?;

        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/events");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token(&parts(&[])).unwrap(), None);
        assert_eq!(
            bearer_token(&parts(&[("authorization", "Bearer abc.def")])).unwrap(),
            Some("abc.def")
        );
        assert_eq!(
            bearer_token(&parts(&[("authorization", "bearer  abc ")])).unwrap(),
            Some("abc")
        );
        assert!(bearer_token(&parts(&[("authorization", "Basic dXNlcg==")])).is_err());
        assert!(bearer_token(&parts(&[("authorization", "Bearer ")])).is_err());
    }

    #[test]
    fn session_header_parsing() {
        let sid = Uuid::new_v4();
        assert_eq!(session_header(&parts(&[])).unwrap(), None);
        assert_eq!(
            session_header(&parts(&[("x-session-id", sid.to_string().as_str())])).unwrap(),
            Some(sid)
        );
        assert!(session_header(&parts(&[("X-Session-Id", "nope")])).is_err());
    }
}
