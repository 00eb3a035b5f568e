use axum::{Json, extract::State};

use quill_types::api::UserResponse;

use crate::auth::{AppState, user_from_row};
use crate::blocking;
use crate::error::ApiResult;

/// Public directory listing. Only non-sensitive fields leave this handler;
/// hashes and OTP state never reach the wire.
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserResponse>>> {
    let st = state.clone();
    let users = blocking(move || {
        let rows = st.db.list_users()?;
        Ok(rows
            .into_iter()
            .map(user_from_row)
            .map(UserResponse::from)
            .collect::<Vec<_>>())
    })
    .await?;

    Ok(Json(users))
}
