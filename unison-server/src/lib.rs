use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use unison_collab::{Collab, Database};

mod auth;
mod config;
mod context;
mod docs;
mod errors;
mod gateway;
pub mod logging;
mod rooms;
mod schemas;
mod serialized;

pub use config::*;
pub use context::ServerContext;
pub use errors::*;

pub type Router<Db> = axum::Router<ServerContext<Db>>;

/// Builds the complete HTTP surface around a collab instance
pub fn router<Db>(collab: Arc<Collab<Db>>) -> axum::Router
where
    Db: Database,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/rooms", rooms::router())
        .nest("/auth", auth::router());

    Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(ServerContext { collab })
}

/// Starts the unison server
pub async fn run_server<Db>(collab: Arc<Collab<Db>>, port: u16) -> std::io::Result<()>
where
    Db: Database,
{
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);
    axum::serve(listener, router(collab)).await
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use unison_collab::{MemoryDatabase, NewUser};
    use unison_core::Config;

    use super::*;

    struct TestServer {
        app: axum::Router,
        collab: Arc<Collab<MemoryDatabase>>,
    }

    impl TestServer {
        fn new() -> Self {
            let collab = Arc::new(Collab::new(MemoryDatabase::new(), Config::default()));

            Self {
                app: router(collab.clone()),
                collab,
            }
        }

        async fn token(&self, username: &str) -> String {
            let user = self
                .collab
                .database()
                .create_user(NewUser {
                    username: username.to_string(),
                    display_name: username.to_string(),
                })
                .await
                .unwrap();

            self.collab.auth.issue_session(user.id).await.unwrap().token
        }

        async fn request(
            &self,
            method: Method,
            path: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Option<Value>) {
            let mut request = Request::builder().method(method).uri(path);

            if let Some(token) = token {
                request = request.header("authorization", format!("Bearer {}", token));
            }

            let request = match body {
                Some(body) => request
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();

            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();

            (status, serde_json::from_slice(&body).ok())
        }
    }

    #[tokio::test]
    async fn requests_need_a_session() {
        let server = TestServer::new();

        let (status, _) = server.request(Method::GET, "/v1/rooms", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = server
            .request(Method::GET, "/v1/rooms", Some("unknown"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = server.token("ada").await;
        let (status, body) = server
            .request(Method::GET, "/v1/auth/user", Some(&token), None)
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["username"], "ada");
    }

    #[tokio::test]
    async fn rooms_over_rest() {
        let server = TestServer::new();
        let leader = server.token("leader").await;
        let listener = server.token("listener").await;

        let (status, body) = server
            .request(
                Method::POST,
                "/v1/rooms",
                Some(&leader),
                Some(json!({ "name": "Lounge" })),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        let room_id = body.unwrap()["id"].as_u64().unwrap();

        let (status, body) = server
            .request(
                Method::POST,
                "/v1/rooms",
                Some(&leader),
                Some(json!({ "name": "Lounge", "skipThreshold": 2 })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.is_none());

        let members = format!("/v1/rooms/{}/members", room_id);
        let (_, body) = server
            .request(Method::POST, &members, Some(&leader), None)
            .await;
        assert_eq!(body.unwrap()["role"], "LEADER");

        let (_, body) = server
            .request(Method::POST, &members, Some(&listener), None)
            .await;
        assert_eq!(body.unwrap()["role"], "LISTENER");

        let (status, body) = server
            .request(
                Method::POST,
                &format!("/v1/rooms/{}/queue", room_id),
                Some(&leader),
                Some(json!({ "mediaRef": "dQw4w9WgXcQ", "title": "Song", "durationSeconds": 200 })),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["mediaRef"], "youtube:dQw4w9WgXcQ");

        let (status, _) = server
            .request(
                Method::POST,
                &format!("/v1/rooms/{}/commands", room_id),
                Some(&listener),
                Some(json!({ "action": "PAUSE" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = server
            .request(
                Method::POST,
                &format!("/v1/rooms/{}/play-next", room_id),
                Some(&leader),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["title"], "Song");

        let (status, body) = server
            .request(
                Method::GET,
                &format!("/v1/rooms/{}/sync", room_id),
                Some(&listener),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::OK);

        let snapshot = body.unwrap();
        assert_eq!(snapshot["status"], "PLAYING");
        assert_eq!(snapshot["current"]["title"], "Song");

        let (_, body) = server
            .request(
                Method::GET,
                &format!("/v1/rooms/{}/queue", room_id),
                Some(&listener),
                None,
            )
            .await;
        assert_eq!(body.unwrap().as_array().unwrap().len(), 0);

        let (status, _) = server
            .request(Method::GET, "/v1/rooms/999", Some(&listener), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn api_document_is_served() {
        let server = TestServer::new();
        let (status, body) = server.request(Method::GET, "/api.json", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.unwrap()["paths"]["/v1/rooms/{id}/commands"].is_object());
    }
}
