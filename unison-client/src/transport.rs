use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use unison_collab::{Collab, Database, RoomHandle, Subscription};
use unison_core::{ClientMessage, Publication, RoomId, UserId};

use crate::{ClientError, ClientResult};

/// A connection between a client session and its room.
///
/// [Transport::recv] must be cancel safe, since sessions wait on it alongside
/// their timers.
#[async_trait]
pub trait Transport
where
    Self: Send + 'static,
{
    /// Opens the connection and joins the room. Called again after the
    /// connection was lost.
    async fn connect(&mut self) -> ClientResult<()>;
    async fn send(&mut self, message: ClientMessage) -> ClientResult<()>;
    /// Waits for the next publication. Fails once the connection is gone.
    async fn recv(&mut self) -> ClientResult<Publication>;
}

/// Connects to a room in the same process
pub struct CollabTransport<Db> {
    collab: Arc<Collab<Db>>,
    room_id: RoomId,
    user_id: UserId,
    connection: Option<(RoomHandle, Subscription)>,
    /// Rejections of operations sent through this transport
    rejected: VecDeque<Publication>,
}

impl<Db> CollabTransport<Db>
where
    Db: Database,
{
    pub fn new(collab: &Arc<Collab<Db>>, room_id: RoomId, user_id: UserId) -> Self {
        Self {
            collab: collab.clone(),
            room_id,
            user_id,
            connection: None,
            rejected: Default::default(),
        }
    }

    /// Drops the connection, as if the network went away
    pub fn disconnect(&mut self) {
        self.connection = None;
    }
}

#[async_trait]
impl<Db> Transport for CollabTransport<Db>
where
    Db: Database,
{
    async fn connect(&mut self) -> ClientResult<()> {
        let room = self.collab.rooms.get(self.room_id)?;

        // Subscribe first so nothing published right after joining is missed
        let subscription = room.subscribe(self.user_id);
        self.collab.rooms.join(self.room_id, self.user_id).await?;

        self.connection = Some((room, subscription));
        Ok(())
    }

    async fn send(&mut self, message: ClientMessage) -> ClientResult<()> {
        let (room, _) = self.connection.as_ref().ok_or(ClientError::Disconnected)?;

        match room.dispatch(self.user_id, message).await.map_err(ClientError::from) {
            Err(ClientError::Rejected(payload)) => {
                self.rejected
                    .push_back(Publication::error(self.user_id, payload.in_room(self.room_id)));

                Ok(())
            }
            result => result,
        }
    }

    async fn recv(&mut self) -> ClientResult<Publication> {
        if let Some(publication) = self.rejected.pop_front() {
            return Ok(publication);
        }

        let (_, subscription) = self.connection.as_mut().ok_or(ClientError::Disconnected)?;

        match subscription.recv().await {
            Some(publication) => Ok(publication.as_ref().clone()),
            None => {
                self.connection = None;
                Err(ClientError::Disconnected)
            }
        }
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a room through a unison server's WebSocket gateway
pub struct WebSocketTransport {
    url: String,
    token: String,
    socket: Option<Socket>,
}

impl WebSocketTransport {
    /// `server` is the server's base URL, such as `ws://localhost:9050`
    pub fn new(server: &str, room_id: RoomId, token: &str) -> Self {
        let url = format!(
            "{}/v1/rooms/{}/gateway",
            server.trim_end_matches('/'),
            room_id
        );

        Self {
            url,
            token: token.to_string(),
            socket: None,
        }
    }

    fn socket(&mut self) -> ClientResult<&mut Socket> {
        self.socket.as_mut().ok_or(ClientError::Disconnected)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> ClientResult<()> {
        let mut request = self.url.as_str().into_client_request()?;

        let authorization = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        request.headers_mut().insert("Authorization", authorization);

        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        self.socket = Some(socket);

        info!("Connected to {}", self.url);
        Ok(())
    }

    async fn send(&mut self, message: ClientMessage) -> ClientResult<()> {
        let text = serde_json::to_string(&message)?;
        self.socket()?.send(Message::Text(text)).await?;

        Ok(())
    }

    async fn recv(&mut self) -> ClientResult<Publication> {
        loop {
            let message = match self.socket()?.next().await {
                Some(message) => message?,
                None => {
                    self.socket = None;
                    return Err(ClientError::Disconnected);
                }
            };

            match message {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(frame) => {
                    debug!("Connection closed by server: {:?}", frame);
                    self.socket = None;

                    return Err(ClientError::Disconnected);
                }
                // Pings are answered by tungstenite itself
                _ => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use unison_collab::{MemoryDatabase, NewRoom};
    use unison_core::{Config, ErrorKind, Payload, RoomSettings, Visibility};

    use super::*;

    #[test]
    fn gateway_url() {
        let transport = WebSocketTransport::new("ws://localhost:9050/", 4, "token");
        assert_eq!(transport.url, "ws://localhost:9050/v1/rooms/4/gateway");
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_come_back_as_errors() {
        let collab = Arc::new(Collab::new(MemoryDatabase::new(), Config::default()));

        let room = collab
            .rooms
            .create_room(NewRoom {
                name: "Test".to_string(),
                visibility: Visibility::Public,
                max_participants: None,
                skip_threshold: 0.5,
                settings: RoomSettings::default(),
                created_by: 1,
            })
            .await
            .unwrap();

        let mut transport = CollabTransport::new(&collab, room.id(), 2);

        assert!(matches!(
            transport.send(ClientMessage::Heartbeat).await,
            Err(ClientError::Disconnected)
        ));

        transport.connect().await.unwrap();
        transport.send(ClientMessage::Skip).await.unwrap();

        loop {
            let publication = transport.recv().await.unwrap();

            if let Payload::Error(error) = publication.payload {
                assert_eq!(error.kind, ErrorKind::Permission);
                break;
            }
        }
    }
}
