use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Redirect, Response};
use chrono::Utc;

use crate::auth::session::SESSION_COOKIE;
use crate::auth::{Role, Session};
use crate::web::AppState;
use crate::web::problem::ApiProblem;

/// Logged-in caller of any role. Without a live session the request is
/// redirected to `/login`.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl CurrentSession {
    pub fn role(&self) -> Role {
        self.0.role
    }
}

/// Logged-in caller allowed to change territories.
#[derive(Debug, Clone)]
pub struct AdminSession(pub Session);

pub enum SessionRejection {
    LoginRequired,
    Forbidden(Role),
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        match self {
            SessionRejection::LoginRequired => Redirect::to("/login").into_response(),
            SessionRejection::Forbidden(role) => ApiProblem::forbidden(role).into_response(),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(SessionRejection::LoginRequired)?;
        state
            .sessions
            .get(&token)
            .await
            .map(CurrentSession)
            .ok_or(SessionRejection::LoginRequired)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentSession(session) = CurrentSession::from_request_parts(parts, state).await?;
        if !session.role.can_mutate() {
            return Err(SessionRejection::Forbidden(session.role));
        }
        Ok(AdminSession(session))
    }
}

/// Value of the session cookie, if the request carries one.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

pub fn session_cookie(session: &Session) -> String {
    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, session.token, max_age
    )
}

pub fn expired_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}
