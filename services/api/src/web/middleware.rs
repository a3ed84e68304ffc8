//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use coaching_core::ports::PortError;
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::auth::session_cookie;
use crate::web::errors::{error_response, HandlerError};
use crate::web::state::AppState;

/// Validates the auth session cookie and inserts the user's `Uuid` into the
/// request extensions. Missing, unknown or expired sessions get a 401, which
/// the browser app turns into a redirect to its login page.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HandlerError> {
    let unauthorized = || error_response(StatusCode::UNAUTHORIZED, "Please log in");

    let auth_session_id = session_cookie(req.headers()).ok_or_else(unauthorized)?;

    let user_id = match state.db.validate_auth_session(auth_session_id).await {
        Ok(user_id) => user_id,
        Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
            debug!("Rejected unknown or expired session");
            return Err(unauthorized());
        }
        Err(e) => {
            error!("Failed to validate auth session: {:?}", e);
            return Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Could not verify your session, please retry",
            ));
        }
    };

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
