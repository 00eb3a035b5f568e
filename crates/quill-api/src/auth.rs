use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use tracing::error;
use uuid::Uuid;

use quill_auth::{otp, password, token};
use quill_db::Database;
use quill_db::models::UserRow;
use quill_db::queries::format_datetime;
use quill_mailer::OtpMailer;
use quill_storage::ImageStore;
use quill_types::api::{
    AuthResponse, MessageResponse, ResendOtpRequest, SignInRequest, SignUpRequest,
    VerifyOtpRequest,
};
use quill_types::models::User;

use crate::error::{ApiError, ApiResult};
use crate::{blocking, parse_timestamp, parse_uuid};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub mailer: Arc<dyn OtpMailer>,
    pub images: Arc<dyn ImageStore>,
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<impl IntoResponse> {
    let SignUpRequest { name, email, password } = req;
    if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "Name, email, and password are required".into(),
        ));
    }

    let st = state.clone();
    let (user, code) =
        blocking(move || register_user(&st.db, &name, &email, &password)).await?;

    // The row stays even if dispatch fails; resend-otp is the recovery path.
    dispatch_otp(state.mailer.as_ref(), &user.email, &code).await?;

    let token = token::mint(&state.jwt_secret, user.id, &user.name)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
        message: Some("Registration successful. An OTP has been sent to your email.".into()),
    }))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let user = blocking(move || verify_user_otp(&st.db, req.user_id, &req.otp)).await?;

    let token = token::mint(&state.jwt_secret, user.id, &user.name)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
        message: Some("Email verified successfully.".into()),
    }))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    Json(req): Json<ResendOtpRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let st = state.clone();
    let (user, code) = blocking(move || refresh_otp(&st.db, &req.email)).await?;

    dispatch_otp(state.mailer.as_ref(), &user.email, &code).await?;

    Ok(Json(MessageResponse {
        message: "A new OTP has been sent to your email.".into(),
    }))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<impl IntoResponse> {
    let SignInRequest { email, password } = req;
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation("Email and password are required".into()));
    }

    let st = state.clone();
    let user = blocking(move || authenticate(&st.db, &email, &password)).await?;

    let token = token::mint(&state.jwt_secret, user.id, &user.name)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
        message: None,
    }))
}

async fn dispatch_otp(mailer: &dyn OtpMailer, email: &str, code: &str) -> ApiResult<()> {
    mailer.send_otp(email, code).await.map_err(|e| {
        error!("OTP email dispatch failed for {}: {}", email, e);
        ApiError::EmailDispatch
    })
}

/// Create an unverified user with a hashed password and a pending OTP.
/// Returns the user plus the plaintext code for dispatch.
pub fn register_user(
    db: &Database,
    name: &str,
    email: &str,
    password: &str,
) -> ApiResult<(User, String)> {
    if db.get_user_by_email(email)?.is_some() {
        return Err(ApiError::DuplicateEmail);
    }

    let password_hash = password::hash_password(password)?;
    let issued = otp::issue();
    let user_id = Uuid::new_v4();

    db.create_user(
        &user_id.to_string(),
        name,
        email,
        &password_hash,
        &issued.code,
        &format_datetime(&issued.expires_at),
    )?;

    let row = db
        .get_user_by_id(&user_id.to_string())?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user vanished after insert")))?;

    Ok((user_from_row(row), issued.code))
}

/// One guarded update: the code must match and be unexpired, or nothing
/// changes and the caller gets `InvalidOrExpiredOtp`.
pub fn verify_user_otp(db: &Database, user_id: Uuid, code: &str) -> ApiResult<User> {
    let id = user_id.to_string();
    if !db.confirm_otp(&id, code)? {
        return Err(ApiError::InvalidOrExpiredOtp);
    }

    let row = db
        .get_user_by_id(&id)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user vanished after verification")))?;

    Ok(user_from_row(row))
}

/// Store a fresh OTP for an unverified user. Returns the user plus the new
/// plaintext code for dispatch.
pub fn refresh_otp(db: &Database, email: &str) -> ApiResult<(User, String)> {
    let row = db.get_user_by_email(email)?.ok_or(ApiError::UserNotFound)?;
    if row.is_verified {
        return Err(ApiError::AlreadyVerified);
    }

    let issued = otp::issue();
    db.set_otp(&row.id, &issued.code, &format_datetime(&issued.expires_at))?;

    Ok((user_from_row(row), issued.code))
}

/// Unknown email and wrong password collapse into the same error so the
/// response never reveals whether an account exists.
pub fn authenticate(db: &Database, email: &str, password: &str) -> ApiResult<User> {
    let row = db
        .get_user_by_email(email)?
        .ok_or(ApiError::InvalidCredentials)?;

    if !password::verify_password(password, &row.password_hash)? {
        return Err(ApiError::InvalidCredentials);
    }

    Ok(user_from_row(row))
}

pub(crate) fn user_from_row(row: UserRow) -> User {
    User {
        id: parse_uuid(&row.id, "user id"),
        name: row.name,
        email: row.email,
        is_verified: row.is_verified,
        created_at: parse_timestamp(&row.created_at, "user"),
    }
}
