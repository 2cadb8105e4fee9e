use std::convert::Infallible;

use axum::extract::{FromRef, FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use http::header::{AUTHORIZATION, COOKIE};
use http::request::Parts;
use http::HeaderMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{event, Level};
use url::form_urlencoded;

use crate::app_state::AppState;
use crate::error::Error;

/// Pages that need a session. Sub-paths are covered too.
const PROTECTED_PAGES: [&str; 2] = ["/history", "/dashboard"];
/// The generator page, gated on its exact path only.
const HOME_PAGE: &str = "/";
const SIGNIN_PAGE: &str = "/signin";
const SIGNED_IN_HOME: &str = "/history";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

/// Checks HS256 session tokens minted by the identity provider.
#[derive(Clone)]
pub struct SessionVerifier {
    secret: Vec<u8>,
    cookie_name: String,
}

impl std::fmt::Debug for SessionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionVerifier")
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

impl SessionVerifier {
    pub fn new(secret: &str, cookie_name: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            cookie_name: cookie_name.to_string(),
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation
    }

    pub fn verify(&self, token: &str) -> Option<Session> {
        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Self::validation(),
        ) {
            Ok(data) if !data.claims.sub.is_empty() => Some(Session {
                user_id: data.claims.sub,
            }),
            Ok(_) => None,
            Err(e) => {
                event!(Level::DEBUG, "Rejected session token: {}", e);
                None
            }
        }
    }

    /// Bearer header first, then the session cookie.
    pub fn resolve(&self, headers: &HeaderMap) -> Option<Session> {
        bearer_token(headers)
            .or_else(|| cookie_value(headers, &self.cookie_name))
            .and_then(|token| self.verify(token))
    }

    /// Mints a token for `user_id` expiring at `exp` (epoch seconds).
    pub fn issue(&self, user_id: &str, exp: i64) -> Result<String, Error> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| Error::Config(format!("Could not sign session token: {}", e)))
    }
}

/// The signed-in caller. Rejects with 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        state
            .sessions
            .resolve(&parts.headers)
            .map(|s| AuthUser(s.user_id))
            .ok_or(Error::Unauthorized)
    }
}

/// The caller if signed in. Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(MaybeAuthUser(
            state.sessions.resolve(&parts.headers).map(|s| s.user_id),
        ))
    }
}

fn is_protected(path: &str) -> bool {
    path == HOME_PAGE
        || PROTECTED_PAGES.iter().any(|page| {
            path == *page
                || path
                    .strip_prefix(page)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
}

pub fn signin_redirect(path: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("callbackUrl", path)
        .finish();
    format!("{}?{}", SIGNIN_PAGE, query)
}

/// Answers 401 before the wrapped route runs.
pub async fn require_session(
    State(sessions): State<SessionVerifier>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    if sessions.resolve(request.headers()).is_none() {
        return Err(Error::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// Redirects page visits according to the session.
pub async fn gate_pages(
    State(sessions): State<SessionVerifier>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if is_protected(path) {
        if sessions.resolve(request.headers()).is_none() {
            return Redirect::temporary(&signin_redirect(path)).into_response();
        }
    } else if path == SIGNIN_PAGE && sessions.resolve(request.headers()).is_some() {
        return Redirect::temporary(SIGNED_IN_HOME).into_response();
    }
    next.run(request).await
}
