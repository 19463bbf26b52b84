use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
    routing::get,
    Json,
};
use unison_collab::{Database, SessionData, UserData};
use unison_core::UserId;

use crate::{
    context::ServerContext,
    errors::ServerError,
    serialized::{ToSerialized, User},
    Router,
};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    /// Returns the user of the session
    pub fn user(&self) -> &UserData {
        &self.0.user
    }

    pub fn user_id(&self) -> UserId {
        self.0.user.id
    }
}

#[async_trait]
impl<Db> FromRequestParts<ServerContext<Db>> for Session
where
    Db: Database,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        context: &ServerContext<Db>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .ok_or(ServerError::Unauthorized("Missing authorization"))?;

        let token = bearer_token(header)
            .ok_or_else(|| ServerError::Validation("Authorization must be Bearer".to_string()))?;

        let session = context.collab.auth.session(token).await?;

        Ok(Self(session))
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let parts: Vec<_> = header.split_ascii_whitespace().collect();

    match parts.as_slice() {
        ["Bearer", token] => Some(*token),
        _ => None,
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/user",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 401, description = "Missing or unknown session")
    )
)]
async fn user(session: Session) -> Json<User> {
    Json(session.user().to_serialized())
}

pub fn router<Db>() -> Router<Db>
where
    Db: Database,
{
    Router::new().route("/user", get(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_tokens() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("  Bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer a b"), None);
    }
}
