use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::captcha::{Challenge, CaptchaError, CAPTCHA_COOKIE};
use crate::auth::users::{self, NewUser};
use crate::error::{AppError, AppResult};
use crate::extractors::{get_cookie_value, CurrentUser};
use crate::state::AppState;

pub const REGISTER_PATH: &str = "/auth/register";

// -- Request / response types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub bio: Option<String>,
    pub captcha_answer: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct ChallengeResponse {
    pub question: String,
    pub expires_at: i64,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user_id: i64,
    pub username: String,
}

// -- Cookie helpers --

fn session_cookie(state: &AppState, token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        state.config.auth.cookie_name,
        token,
        state.sessions.ttl().num_seconds()
    )
}

fn clear_session_cookie(state: &AppState) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        state.config.auth.cookie_name
    )
}

fn captcha_cookie(state: &AppState, value: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}",
        CAPTCHA_COOKIE,
        value,
        REGISTER_PATH,
        state.captcha.ttl().num_seconds()
    )
}

fn clear_captcha_cookie() -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path={}; Max-Age=0",
        CAPTCHA_COOKIE, REGISTER_PATH
    )
}

/// Trim and drop empty optional form fields.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// -- Registration --

/// GET /auth/register: issue a fresh captcha challenge.
/// Any earlier challenge cookie for this client is overwritten.
pub async fn register_page(State(state): State<AppState>) -> AppResult<Response> {
    let challenge = state.captcha.generate_challenge();
    let cookie = captcha_cookie(&state, &challenge.encode_cookie()?);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(ChallengeResponse {
            question: challenge.question,
            expires_at: challenge.expires_at,
        }),
    )
        .into_response())
}

/// POST /auth/register: check the captcha, create the user, start a session.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    let challenge = get_cookie_value(&headers, CAPTCHA_COOKIE)
        .ok_or(CaptchaError::Missing)
        .and_then(Challenge::decode_cookie)?;
    state.captcha.check(&req.captcha_answer, &challenge)?;

    let username = req.username.trim();
    let username_len = username.chars().count();
    if !(3..=32).contains(&username_len) {
        return Err(AppError::BadRequest(
            "Username must be between 3 and 32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }

    let user_id = users::create_user(
        &state.db,
        &NewUser {
            username,
            email: non_empty(req.email.as_deref()),
            password: &req.password,
            bio: non_empty(req.bio.as_deref()),
        },
        state.config.auth.bcrypt_cost,
    )?;
    tracing::info!(user_id, "Registered new user");

    let token = state.sessions.issue_session(user_id).await?;

    Ok((
        StatusCode::CREATED,
        AppendHeaders([
            (header::SET_COOKIE, session_cookie(&state, &token)),
            (header::SET_COOKIE, clear_captcha_cookie()),
        ]),
        Json(AuthResponse {
            user_id,
            username: username.to_string(),
        }),
    )
        .into_response())
}

// -- Login / logout --

/// POST /auth/login: verify the password and start a session.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let user = users::authenticate(&state.db, req.username.trim(), &req.password)?;
    let token = state.sessions.issue_session(user.id).await?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&state, &token))],
        Json(AuthResponse {
            user_id: user.id,
            username: user.username,
        }),
    )
        .into_response())
}

/// POST /auth/logout: delete the session and redirect home.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = get_cookie_value(&headers, &state.config.auth.cookie_name) {
        state.sessions.invalidate(token).await?;
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (header::SET_COOKIE, clear_session_cookie(&state)),
        ],
    )
        .into_response())
}

/// GET /auth/me: profile of the caller.
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let profile = users::find_by_id(&state.db, user.id)?.ok_or(AppError::Unauthorized)?;
    Ok(Json(profile).into_response())
}
