use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::AppState;
use crate::error::ApiError;

/// The verified identity behind a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
}

/// Identity as seen by handlers: `None` means the caller is anonymous.
#[derive(Debug, Clone, Default)]
pub struct MaybeUser(pub Option<AuthUser>);

/// Attach the caller's identity to the request.
///
/// Asymmetric on purpose: no credential at all means anonymous and the
/// request proceeds; a credential that is present but invalid or expired is
/// rejected outright. Handlers that need identity check for it themselves.
pub async fn attach_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    let identity = match token {
        None => MaybeUser(None),
        Some(token) => {
            let claims = quill_auth::token::verify(&state.jwt_secret, token)
                .map_err(|_| ApiError::InvalidToken)?;
            MaybeUser(Some(AuthUser {
                id: claims.sub,
                name: claims.name,
            }))
        }
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Second whitespace-separated part of the Authorization header.
/// A bare scheme with no token counts as no credential at all.
fn bearer_token(header: &str) -> Option<&str> {
    header.split_whitespace().nth(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_after_scheme() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
    }

    #[test]
    fn bare_scheme_is_no_credential() {
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token(""), None);
    }
}
