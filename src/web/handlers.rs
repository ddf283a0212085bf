use axum::{
    Form, Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::auth::{AuthError, Role};
use crate::core::dates::parse_form_date;
use crate::core::{HistoryEntry, Territory, TerritoryId};
use crate::lifecycle::{AssignRequest, NotesPolicy, TakenTerritory};
use crate::web::AppState;
use crate::web::problem::{ApiProblem, ApiResult};
use crate::web::session::{
    AdminSession, CurrentSession, expired_cookie, session_cookie, session_token,
};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub error: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginPage {
    pub roles: Vec<Role>,
    pub error: bool,
}

pub async fn login_form(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Json<LoginPage> {
    Json(LoginPage {
        roles: state.auth.enabled_roles(),
        error: query.error,
    })
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub role: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Response> {
    let role = match state.auth.authenticate(&form.role, &form.password).await {
        Ok(role) => role,
        Err(AuthError::InvalidCredentials | AuthError::UnknownRole(_)) => {
            return Ok(Redirect::to("/login?error=true").into_response());
        }
        Err(err) => return Err(ApiProblem::from_auth(err)),
    };

    let session = state.sessions.create(role).await;
    info!(role = %role, "login succeeded");
    Ok((
        [(header::SET_COOKIE, session_cookie(&session))],
        Redirect::to("/"),
    )
        .into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(&token).await;
    }
    ([(header::SET_COOKIE, expired_cookie())], Redirect::to("/login")).into_response()
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub role: Role,
    pub taken: Vec<TakenTerritory>,
    pub free: Vec<Territory>,
}

pub async fn overview(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Json<OverviewResponse> {
    let overview = state.engine.overview().await;
    let role = session.role();

    if role.sees_assignments() {
        return Json(OverviewResponse {
            role,
            taken: overview.taken,
            free: overview.free,
        });
    }

    Json(OverviewResponse {
        role,
        taken: Vec::new(),
        free: overview.free.into_iter().map(redact).collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct DetailsResponse {
    pub role: Role,
    pub can_edit: bool,
    pub territory: Territory,
    pub history: Vec<HistoryEntry>,
    pub due_soon: bool,
}

pub async fn details(
    State(state): State<AppState>,
    session: CurrentSession,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<DetailsResponse>> {
    let id = parse_id(&raw_id)?;
    let details = state
        .engine
        .details(id)
        .await
        .map_err(ApiProblem::from_domain)?;
    let role = session.role();

    let (territory, history) = if role.sees_assignments() {
        (details.territory, details.history)
    } else {
        (redact(details.territory), Vec::new())
    };

    Ok(Json(DetailsResponse {
        role,
        can_edit: role.can_mutate(),
        territory,
        history,
        due_soon: details.due_soon,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateForm {
    #[serde(default)]
    pub taken_by: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub date_taken: String,
    #[serde(default)]
    pub date_due: String,
}

/// Edit form submit: a holder assigns, an empty holder frees an assigned
/// territory, otherwise only the notes are saved.
pub async fn update(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(raw_id): Path<String>,
    Form(form): Form<UpdateForm>,
) -> ApiResult<Redirect> {
    let id = parse_id(&raw_id)?;
    let engine = &state.engine;
    let taken_by = form.taken_by.trim();

    if !taken_by.is_empty() {
        let request = AssignRequest {
            assignee: taken_by.to_string(),
            taken_on: parse_form_date(&form.date_taken).map_err(ApiProblem::from_domain)?,
            due_on: parse_form_date(&form.date_due).map_err(ApiProblem::from_domain)?,
            notes: form.notes,
        };
        engine
            .assign(id, request)
            .await
            .map_err(ApiProblem::from_domain)?;
        return Ok(Redirect::to("/"));
    }

    let current = engine
        .store()
        .get_territory(id)
        .await
        .map_err(ApiProblem::from_domain)?;
    if current.is_assigned() {
        engine
            .release_with_notes(id, form.notes)
            .await
            .map_err(ApiProblem::from_domain)?;
    } else if let Some(notes) = form.notes {
        engine
            .update_notes(id, notes)
            .await
            .map_err(ApiProblem::from_domain)?;
    }
    Ok(Redirect::to("/"))
}

pub async fn release(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(raw_id): Path<String>,
) -> ApiResult<Redirect> {
    let id = parse_id(&raw_id)?;
    state
        .engine
        .release(id)
        .await
        .map_err(ApiProblem::from_domain)?;
    Ok(Redirect::to("/"))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearForm {
    #[serde(default)]
    pub clear_notes: Option<String>,
}

impl ClearForm {
    fn policy(&self) -> NotesPolicy {
        match self.clear_notes.as_deref().map(str::trim) {
            Some("on" | "true" | "1" | "yes") => NotesPolicy::Clear,
            _ => NotesPolicy::Preserve,
        }
    }
}

pub async fn clear(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(raw_id): Path<String>,
    Form(form): Form<ClearForm>,
) -> ApiResult<Redirect> {
    let id = parse_id(&raw_id)?;
    state
        .engine
        .clear_history(id, form.policy())
        .await
        .map_err(ApiProblem::from_domain)?;
    Ok(Redirect::to(&format!("/update/{}", id)))
}

pub async fn upload_photo(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(raw_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Redirect> {
    let id = parse_id(&raw_id)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiProblem::bad_request(e.to_string()))?
    {
        if field.name() != Some("photo") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiProblem::bad_request(e.to_string()))?;

        state
            .photos
            .save_upload(state.engine.store(), id, &file_name, &bytes)
            .await
            .map_err(ApiProblem::from_import)?;
        return Ok(Redirect::to(&format!("/update/{}", id)));
    }

    Err(ApiProblem::bad_request("multipart field 'photo' is missing"))
}

fn parse_id(raw: &str) -> ApiResult<TerritoryId> {
    raw.parse::<TerritoryId>().map_err(ApiProblem::from_domain)
}

/// Courier view of a territory: no holder, no notes.
fn redact(mut territory: Territory) -> Territory {
    territory.assignee.clear();
    territory.notes.clear();
    territory
}

