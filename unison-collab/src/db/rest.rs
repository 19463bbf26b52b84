use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use unison_core::{
    EntryId, NewQueueEntry, Participant, PlayHistoryEntry, Playback, QueueEntry, RoomId, UserId,
};
use url::Url;

use crate::{
    Database, DatabaseError, IntoDatabaseError, NewRoom, NewRoomMember, NewSession, NewUser,
    Result, RoomData, RoomMemberData, SessionData, UserData,
};

/// A database backed by an external persistence service speaking JSON over HTTP
#[derive(Debug, Clone)]
pub struct RestDatabase {
    client: Client,
    base: Url,
}

impl RestDatabase {
    pub fn new(base: &str) -> Result<Self> {
        let mut base = Url::parse(base).map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        // Relative joins drop the last segment unless the path ends with a slash
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(self.client.request(method, url))
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        resource: &'static str,
        identifier: &'static str,
    ) -> Result<Response> {
        let response = builder.send().await.map_err(|e| e.any())?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        Err(handle_unsuccessful_request(response, status, resource, identifier).await)
    }

    async fn get<T>(&self, path: &str, resource: &'static str, identifier: &'static str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let builder = self.request(Method::GET, path)?;
        let response = self.send(builder, resource, identifier).await?;

        response.json().await.map_err(|e| e.any())
    }

    async fn write<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        resource: &'static str,
        identifier: &'static str,
    ) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let builder = self.request(method, path)?.json(body);
        let response = self.send(builder, resource, identifier).await?;

        response.json().await.map_err(|e| e.any())
    }

    /// Like [RestDatabase::write], for endpoints that answer without a body
    async fn write_empty<B>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        resource: &'static str,
        identifier: &'static str,
    ) -> Result<()>
    where
        B: Serialize + Sync,
    {
        let builder = self.request(method, path)?.json(body);
        self.send(builder, resource, identifier).await?;

        Ok(())
    }

    async fn delete(&self, path: &str, resource: &'static str, identifier: &'static str) -> Result<()> {
        let builder = self.request(Method::DELETE, path)?;
        self.send(builder, resource, identifier).await?;

        Ok(())
    }
}

async fn handle_unsuccessful_request(
    response: Response,
    status: StatusCode,
    resource: &'static str,
    identifier: &'static str,
) -> DatabaseError {
    match status {
        StatusCode::NOT_FOUND => DatabaseError::NotFound {
            resource,
            identifier,
        },
        StatusCode::CONFLICT => DatabaseError::Conflict {
            resource,
            field: identifier,
            value: response.text().await.unwrap_or_default(),
        },
        status => {
            let body = response.text().await.unwrap_or_default();
            DatabaseError::Internal(format!("Persistence service returned {}: {}", status, body).into())
        }
    }
}

impl IntoDatabaseError for reqwest::Error {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self.status() {
            Some(StatusCode::NOT_FOUND) => DatabaseError::NotFound {
                resource,
                identifier,
            },
            _ => self.any(),
        }
    }
}

#[async_trait]
impl Database for RestDatabase {
    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        self.get(&format!("sessions/{}", token), "session", "token")
            .await
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.write(Method::POST, "sessions", &new_session, "session", "token")
            .await
    }

    async fn user_by_id(&self, user_id: UserId) -> Result<UserData> {
        self.get(&format!("users/{}", user_id), "user", "id").await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.write(Method::POST, "users", &new_user, "user", "username")
            .await
    }

    async fn room_by_id(&self, room_id: RoomId) -> Result<RoomData> {
        self.get(&format!("rooms/{}", room_id), "room", "id").await
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        self.get("rooms", "room", "id").await
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        self.write(Method::POST, "rooms", &new_room, "room", "name")
            .await
    }

    async fn create_room_member(&self, new_member: NewRoomMember) -> Result<RoomMemberData> {
        let path = format!("rooms/{}/members", new_member.room_id);

        self.write(Method::POST, &path, &new_member, "room member", "user_id")
            .await
    }

    async fn delete_room_member(&self, room_id: RoomId, user_id: UserId) -> Result<()> {
        let path = format!("rooms/{}/members/{}", room_id, user_id);
        self.delete(&path, "room member", "user_id").await
    }

    async fn list_queue_entries(&self, room_id: RoomId) -> Result<Vec<QueueEntry>> {
        self.get(&format!("rooms/{}/queue", room_id), "room", "id")
            .await
    }

    async fn create_queue_entry(&self, new_entry: NewQueueEntry) -> Result<QueueEntry> {
        let path = format!("rooms/{}/queue", new_entry.room_id);
        // Ids are assigned by the service, so send the entry without one
        let body = new_entry.with_id(0);

        self.write(Method::POST, &path, &body, "queue entry", "id")
            .await
    }

    async fn update_queue_entry(&self, entry: QueueEntry) -> Result<()> {
        let path = format!("rooms/{}/queue/{}", entry.room_id, entry.id);

        self.write_empty(Method::PUT, &path, &entry, "queue entry", "id")
            .await
    }

    async fn delete_queue_entry(&self, room_id: RoomId, entry_id: EntryId) -> Result<()> {
        let path = format!("rooms/{}/queue/{}", room_id, entry_id);
        self.delete(&path, "queue entry", "id").await
    }

    async fn playback_by_room(&self, room_id: RoomId) -> Result<Playback> {
        self.get(&format!("rooms/{}/playback", room_id), "playback", "room_id")
            .await
    }

    async fn save_playback(&self, playback: Playback) -> Result<()> {
        let path = format!("rooms/{}/playback", playback.room_id);

        self.write_empty(Method::PUT, &path, &playback, "playback", "room_id")
            .await
    }

    async fn save_participant(&self, participant: Participant) -> Result<()> {
        let path = format!(
            "rooms/{}/participants/{}",
            participant.room_id, participant.user_id
        );

        self.write_empty(Method::PUT, &path, &participant, "participant", "user_id")
            .await
    }

    async fn delete_participant(&self, room_id: RoomId, user_id: UserId) -> Result<()> {
        let path = format!("rooms/{}/participants/{}", room_id, user_id);
        self.delete(&path, "participant", "user_id").await
    }

    async fn create_history_entry(&self, room_id: RoomId, record: PlayHistoryEntry) -> Result<()> {
        let path = format!("rooms/{}/history", room_id);

        self.write_empty(Method::POST, &path, &record, "history entry", "id")
            .await
    }

    async fn list_history(&self, room_id: RoomId) -> Result<Vec<PlayHistoryEntry>> {
        self.get(&format!("rooms/{}/history", room_id), "room", "id")
            .await
    }
}
