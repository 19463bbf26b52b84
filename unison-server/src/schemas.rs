use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use unison_core::{PlaybackAction, RoomSettings, Visibility, VoteType};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServerError;

fn default_skip_threshold() -> f64 {
    0.5
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRoomSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "PUBLIC")]
    pub visibility: Visibility,
    #[validate(range(min = 1))]
    pub max_participants: Option<u32>,
    #[serde(default = "default_skip_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub skip_threshold: f64,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub settings: RoomSettings,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitSchema {
    /// A YouTube id or URL, a remote URL, or a `file://` path
    #[validate(length(min = 1, max = 2048))]
    pub media_ref: String,
    #[serde(default)]
    #[validate(length(max = 256))]
    pub title: String,
    #[validate(range(min = 0.0))]
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VoteSchema {
    #[schema(value_type = String, example = "SKIP")]
    pub vote_type: VoteType,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommandSchema {
    #[schema(value_type = String, example = "SEEK")]
    pub action: PlaybackAction,
    #[validate(range(min = 0.0))]
    pub seek_position_seconds: Option<f64>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|e| ServerError::Validation(e.body_text()))?;

        extracted_json
            .0
            .validate()
            .map_err(|e| ServerError::Validation(format!("Request body is invalid: {}", e)))?;

        Ok(Self(extracted_json.0))
    }
}
