use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipauto::utoipauto;

#[utoipauto(paths = "./unison-server/src")]
#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    tags(
        (name = "rooms", description = "Rooms and their participants"),
        (name = "queue", description = "Submitting and voting on queue entries"),
        (name = "playback", description = "Transport commands and synchronization"),
        (name = "auth", description = "The identity behind a session")
    ),
    info(
        description = "unison-server exposes synchronized listening rooms over REST and a WebSocket gateway"
    ))
]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
