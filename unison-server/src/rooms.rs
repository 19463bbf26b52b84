use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json,
};
use unison_collab::{Database, NewRoom, RoomHandle};
use unison_core::{EntryId, RoomId, Visibility};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    gateway,
    schemas::{CommandSchema, NewRoomSchema, SubmitSchema, ValidatedJson, VoteSchema},
    serialized::{
        Participant, PlayHistoryEntry, PlaybackCommand, QueueEntry, Room, RoomOverview,
        SyncSnapshot, ToSerialized, VoteTally,
    },
    Router,
};

async fn overview(room: &RoomHandle) -> ServerResult<RoomOverview> {
    Ok(RoomOverview {
        info: room.info().await?,
        snapshot: room.snapshot().await?,
        participants: room.participants().await?,
    })
}

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Public rooms, and private rooms the user is in", body = Vec<Room>)
    )
)]
async fn list_rooms<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
) -> ServerResult<Json<Vec<Room>>>
where
    Db: Database,
{
    let mut rooms = vec![];

    for room in context.collab.rooms.list_all() {
        let overview = overview(&room).await?;

        let is_visible = overview.info.visibility == Visibility::Public
            || overview
                .participants
                .iter()
                .any(|p| p.user_id == session.user_id());

        if is_visible {
            rooms.push(overview.to_serialized());
        }
    }

    Ok(Json(rooms))
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The room was created, led by the user", body = Room)
    )
)]
async fn create_room<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Room>>
where
    Db: Database,
{
    let room = context
        .collab
        .rooms
        .create_room(NewRoom {
            name: body.name,
            visibility: body.visibility,
            max_participants: body.max_participants,
            skip_threshold: body.skip_threshold,
            settings: body.settings,
            created_by: session.user_id(),
        })
        .await?;

    Ok(Json(overview(&room).await?.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room),
        (status = 404, description = "Room does not exist")
    )
)]
async fn room<Db>(
    _session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
) -> ServerResult<Json<Room>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;

    Ok(Json(overview(&room).await?.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/members",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The user joined the room", body = Participant),
        (status = 403, description = "The room is full, or private and the user is not a member")
    )
)]
async fn join<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
) -> ServerResult<Json<Participant>>
where
    Db: Database,
{
    let participant = context
        .collab
        .rooms
        .join(room_id, session.user_id())
        .await?;

    Ok(Json(participant.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{id}/members",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The user left the room")
    )
)]
async fn leave<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
) -> ServerResult<()>
where
    Db: Database,
{
    context
        .collab
        .rooms
        .leave(room_id, session.user_id())
        .await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/participants",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Participant>)
    )
)]
async fn participants<Db>(
    _session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
) -> ServerResult<Json<Vec<Participant>>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;

    Ok(Json(room.participants().await?.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/queue",
    tag = "queue",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Entries in the order they will play", body = Vec<QueueEntry>)
    )
)]
async fn queue<Db>(
    _session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
) -> ServerResult<Json<Vec<QueueEntry>>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;

    Ok(Json(room.queue().await?.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/queue",
    tag = "queue",
    request_body = SubmitSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The entry was added to the queue", body = QueueEntry),
        (status = 400, description = "The submission breaks the room's policy")
    )
)]
async fn submit<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
    ValidatedJson(body): ValidatedJson<SubmitSchema>,
) -> ServerResult<Json<QueueEntry>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;

    let entry = room
        .submit(
            session.user_id(),
            &body.media_ref,
            &body.title,
            body.duration_seconds,
        )
        .await?;

    Ok(Json(entry.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{id}/queue/{entry_id}",
    tag = "queue",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The entry was removed", body = QueueEntry),
        (status = 403, description = "Only the submitter, moderators, and the leader may remove entries")
    )
)]
async fn remove_entry<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path((room_id, entry_id)): Path<(RoomId, EntryId)>,
) -> ServerResult<Json<QueueEntry>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;
    let entry = room.remove_entry(entry_id, session.user_id()).await?;

    Ok(Json(entry.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/queue/{entry_id}/votes",
    tag = "queue",
    request_body = VoteSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The vote was cast, or withdrawn if it already was", body = VoteTally)
    )
)]
async fn vote<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path((room_id, entry_id)): Path<(RoomId, EntryId)>,
    ValidatedJson(body): ValidatedJson<VoteSchema>,
) -> ServerResult<Json<VoteTally>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;
    let tally = room
        .vote(entry_id, session.user_id(), body.vote_type)
        .await?;

    Ok(Json(tally.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/play-next",
    tag = "playback",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The entry now playing, or null if the queue was empty", body = QueueEntry)
    )
)]
async fn play_next<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
) -> ServerResult<Json<Option<QueueEntry>>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;
    let entry = room.play_next(Some(session.user_id())).await?;

    Ok(Json(entry.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/skip",
    tag = "playback",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The entry now playing, or null if the queue was empty", body = QueueEntry)
    )
)]
async fn skip<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
) -> ServerResult<Json<Option<QueueEntry>>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;
    let entry = room.skip(session.user_id()).await?;

    Ok(Json(entry.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/commands",
    tag = "playback",
    request_body = CommandSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The command that was broadcast, or null if there was nothing to play", body = PlaybackCommand),
        (status = 403, description = "Only moderators and the leader may issue commands")
    )
)]
async fn issue_command<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
    ValidatedJson(body): ValidatedJson<CommandSchema>,
) -> ServerResult<Json<Option<PlaybackCommand>>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;
    let command = room
        .issue_command(session.user_id(), body.action, body.seek_position_seconds)
        .await?;

    Ok(Json(command.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/sync",
    tag = "playback",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SyncSnapshot),
        (status = 403, description = "The user has not joined the room")
    )
)]
async fn sync<Db>(
    session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
) -> ServerResult<Json<SyncSnapshot>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;
    let snapshot = room.request_sync(session.user_id()).await?;

    Ok(Json(snapshot.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/history",
    tag = "playback",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Entries that finished playing, oldest first", body = Vec<PlayHistoryEntry>)
    )
)]
async fn history<Db>(
    _session: Session,
    State(context): State<ServerContext<Db>>,
    Path(room_id): Path<RoomId>,
) -> ServerResult<Json<Vec<PlayHistoryEntry>>>
where
    Db: Database,
{
    let room = context.collab.rooms.get(room_id)?;

    Ok(Json(room.history().await?.to_serialized()))
}

pub fn router<Db>() -> Router<Db>
where
    Db: Database,
{
    Router::new()
        .route("/", get(list_rooms::<Db>).post(create_room::<Db>))
        .route("/:id", get(room::<Db>))
        .route("/:id/members", post(join::<Db>).delete(leave::<Db>))
        .route("/:id/participants", get(participants::<Db>))
        .route("/:id/queue", get(queue::<Db>).post(submit::<Db>))
        .route("/:id/queue/:entry_id", delete(remove_entry::<Db>))
        .route("/:id/queue/:entry_id/votes", post(vote::<Db>))
        .route("/:id/play-next", post(play_next::<Db>))
        .route("/:id/skip", post(skip::<Db>))
        .route("/:id/commands", post(issue_command::<Db>))
        .route("/:id/sync", get(sync::<Db>))
        .route("/:id/history", get(history::<Db>))
        .route("/:id/gateway", get(gateway::gateway::<Db>))
}
