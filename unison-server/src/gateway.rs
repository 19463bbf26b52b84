use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use log::{debug, info, warn};
use unison_collab::{CollabError, Database, RoomHandle, Subscription};
use unison_core::{ClientMessage, ErrorKind, ErrorPayload, Publication, RoomId, UserId};

use crate::{auth::Session, context::ServerContext, errors::ServerResult};

type Outgoing = SplitSink<WebSocket, Message>;

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/gateway",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (
            status = 101,
            description = "Joins the room and switches to a WebSocket carrying publications out and client messages in"
        ),
        (status = 403, description = "The room is full, or private and the user is not a member")
    )
)]
pub async fn gateway<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
    upgrade: WebSocketUpgrade,
) -> ServerResult<Response>
where
    Db: Database,
{
    let user_id = session.user_id();
    let room = context.collab.rooms.get(room_id)?;

    // Subscribe before joining so the join itself is not missed
    let subscription = room.subscribe(user_id);
    context.collab.rooms.join(room_id, user_id).await?;

    Ok(upgrade.on_upgrade(move |socket| serve(socket, room, subscription, user_id)))
}

async fn serve(
    socket: WebSocket,
    room: RoomHandle,
    mut subscription: Subscription,
    user_id: UserId,
) {
    if let Err(err) = room.connect(user_id).await {
        debug!("Could not register connection of user {}: {}", user_id, err);
        return;
    }

    info!("User {} connected to room {}", user_id, room.id());

    let (mut outgoing, mut incoming) = socket.split();

    loop {
        tokio::select! {
            publication = subscription.recv() => {
                let Some(publication) = publication else {
                    break;
                };

                if let Err(err) = send(&mut outgoing, &publication).await {
                    debug!("Could not send to user {}: {}", user_id, err);
                    break;
                }
            }
            message = incoming.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!("Connection of user {} failed: {}", user_id, err);
                        break;
                    }
                };

                if let Some(error) = handle_text(&room, user_id, &text).await {
                    let publication = Publication::error(user_id, error.in_room(room.id()));

                    if send(&mut outgoing, &publication).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // The user stays a participant until they leave, but goes offline once
    // their last connection is closed
    if let Err(err) = room.disconnect(user_id).await {
        debug!("Could not mark user {} offline: {}", user_id, err);
    }

    info!("User {} disconnected from room {}", user_id, room.id());
}

/// Applies a client message, returning the error to report back if it failed
async fn handle_text(room: &RoomHandle, user_id: UserId, text: &str) -> Option<ErrorPayload> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            return Some(ErrorPayload {
                kind: ErrorKind::Validation,
                message: format!("Invalid message: {}", err),
                room_id: None,
            })
        }
    };

    debug!("User {} sent {:?}", user_id, message);

    match room.dispatch(user_id, message).await {
        Ok(()) => None,
        Err(err) => Some(error_payload(err)),
    }
}

fn error_payload(error: CollabError) -> ErrorPayload {
    match error {
        CollabError::Room(e) => (&e).into(),
        e => {
            warn!("Gateway operation failed: {}", e);

            ErrorPayload {
                kind: e.kind().unwrap_or(ErrorKind::Connection),
                message: e.to_string(),
                room_id: None,
            }
        }
    }
}

async fn send(outgoing: &mut Outgoing, publication: &Publication) -> Result<(), axum::Error> {
    let text = serde_json::to_string(publication).map_err(axum::Error::new)?;
    outgoing.send(Message::Text(text)).await
}
