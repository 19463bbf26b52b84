use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

use unison_core::UserId;

use crate::{util::random_string, Database, DatabaseError, NewSession, SessionData};

/// Resolves bearer tokens to identities. Accounts themselves are managed
/// by the identity provider behind the [Database].
pub struct Auth<Db> {
    db: Arc<Db>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The token is unknown or expired
    #[error("Invalid or expired session")]
    InvalidSession,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

impl<Db> Auth<Db>
where
    Db: Database,
{
    const SESSION_DURATION_IN_DAYS: usize = 7;

    pub fn new(db: &Arc<Db>) -> Self {
        Self { db: db.clone() }
    }

    /// Returns the session for a token, if it exists and is still valid
    pub async fn session(&self, token: &str) -> Result<SessionData, AuthError> {
        let session = self.db.session_by_token(token).await.map_err(|e| match e {
            DatabaseError::NotFound { .. } => AuthError::InvalidSession,
            err => AuthError::Db(err),
        })?;

        if !is_session_valid(&session) {
            return Err(AuthError::InvalidSession);
        }

        Ok(session)
    }

    /// Issues a new session for an existing user
    pub async fn issue_session(&self, user_id: UserId) -> Result<SessionData, AuthError> {
        let expires_at = Utc::now() + Duration::days(Self::SESSION_DURATION_IN_DAYS as i64);

        let new_session = NewSession {
            token: random_string(32),
            user_id,
            expires_at: Some(expires_at),
        };

        self.db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }
}

/// Returns true if the session has not expired yet
pub fn is_session_valid(session: &SessionData) -> bool {
    session.expires_at.map_or(true, |at| at > Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryDatabase, NewUser};

    #[tokio::test]
    async fn issued_sessions_resolve() {
        let db = Arc::new(MemoryDatabase::new());
        let auth = Auth::new(&db);

        let user = db
            .create_user(NewUser {
                username: "grace".to_string(),
                display_name: "Grace".to_string(),
            })
            .await
            .unwrap();

        let session = auth.issue_session(user.id).await.unwrap();
        assert_eq!(session.token.len(), 32);

        let resolved = auth.session(&session.token).await.unwrap();
        assert_eq!(resolved.user.id, user.id);

        assert!(matches!(
            auth.session("unknown").await,
            Err(AuthError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected() {
        let db = Arc::new(MemoryDatabase::new());
        let auth = Auth::new(&db);

        let user = db
            .create_user(NewUser {
                username: "linus".to_string(),
                display_name: "Linus".to_string(),
            })
            .await
            .unwrap();

        db.create_session(NewSession {
            token: "old".to_string(),
            user_id: user.id,
            expires_at: Some(Utc::now() - Duration::minutes(1)),
        })
        .await
        .unwrap();

        assert!(matches!(
            auth.session("old").await,
            Err(AuthError::InvalidSession)
        ));
    }
}
