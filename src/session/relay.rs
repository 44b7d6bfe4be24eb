use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use warp::ws::Message;

use crate::error::CoordinatorError;
use crate::session::now_ms;
use crate::session::registry::{ConnectionId, Participant, RoomRegistry};
use crate::session::signaling::{ClientMessage, ServerMessage};

/// Room-scoped publish/subscribe relay for connection-negotiation and chat
/// traffic. Owns the table of live connection senders; room membership
/// itself lives in the [`RoomRegistry`].
///
/// Every inbound message is handled independently; the only serialization
/// point is the registry's membership lock. Error signals are delivered
/// back to the requester only, as `meeting-error` messages.
pub struct SignalingRelay {
    registry: Arc<RoomRegistry>,
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>,
    next_conn_id: AtomicU64,
}

impl SignalingRelay {
    pub fn new(registry: Arc<RoomRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            senders: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        })
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Register a live connection's outbound channel and mint its id.
    pub async fn register(&self, tx: mpsc::UnboundedSender<Message>) -> ConnectionId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.senders.write().await.insert(conn_id, tx);
        tracing::debug!(conn_id, "Signaling connection registered");
        conn_id
    }

    /// Connection loss: drop the sender, sweep the connection out of every
    /// room it joined and broadcast one `peer-left` per affected room.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        self.senders.write().await.remove(&conn_id);

        for (code, participant, remaining) in self.registry.disconnect(conn_id).await {
            tracing::info!(conn_id, room = %code, username = %participant.username, "Participant disconnected");
            self.broadcast(
                &remaining,
                &ServerMessage::PeerLeft {
                    username: participant.username,
                },
            )
            .await;
        }
    }

    pub async fn handle_message(&self, conn_id: ConnectionId, msg: ClientMessage) {
        self.handle_message_at(conn_id, msg, now_ms()).await;
    }

    pub async fn handle_message_at(&self, conn_id: ConnectionId, msg: ClientMessage, now: u64) {
        if let Err(e) = self.dispatch(conn_id, msg, now).await {
            tracing::debug!(conn_id, error = %e, "Signaling request rejected");
            self.send(
                conn_id,
                &ServerMessage::MeetingError {
                    error: e.wire_code().to_string(),
                },
            )
            .await;
        }
    }

    async fn dispatch(
        &self,
        conn_id: ConnectionId,
        msg: ClientMessage,
        now: u64,
    ) -> crate::error::Result<()> {
        match msg {
            ClientMessage::Join { room, username, role } => {
                self.handle_join(conn_id, room, username, role, now).await
            }
            ClientMessage::Leave { room, .. } => self.handle_leave(conn_id, room, now).await,
            ClientMessage::Offer { .. } => self.handle_offer(conn_id, msg, now).await,
            ClientMessage::Answer { .. } | ClientMessage::IceCandidate { .. } => {
                self.handle_relay(conn_id, msg, now).await
            }
            ClientMessage::ChatMessage {
                room,
                username,
                message,
                ts,
            } => self.handle_chat(room, username, message, ts, now).await,
            ClientMessage::ParticipantsRequest { room } => {
                self.handle_participants_request(conn_id, room, now).await
            }
        }
    }

    async fn handle_join(
        &self,
        conn_id: ConnectionId,
        room: Option<String>,
        username: String,
        role: String,
        now: u64,
    ) -> crate::error::Result<()> {
        let room = required_room(room)?;
        let others = self
            .registry
            .join_at(
                &room,
                conn_id,
                Participant {
                    username: username.clone(),
                    role,
                },
                now,
            )
            .await?;

        tracing::info!(conn_id, room = %room, username = %username, "Participant joined");
        self.broadcast(&others, &ServerMessage::PeerJoined { username })
            .await;
        Ok(())
    }

    async fn handle_leave(
        &self,
        conn_id: ConnectionId,
        room: Option<String>,
        now: u64,
    ) -> crate::error::Result<()> {
        let Some(room) = room.filter(|r| !r.is_empty()) else {
            return Ok(());
        };
        let (removed, remaining) = self.registry.leave_at(&room, conn_id, now).await?;

        if let Some(participant) = removed {
            tracing::info!(conn_id, room = %room, username = %participant.username, "Participant left");
            self.broadcast(
                &remaining,
                &ServerMessage::PeerLeft {
                    username: participant.username,
                },
            )
            .await;
        }
        Ok(())
    }

    /// `offer` starts the call, so it is restricted to the recorded host.
    async fn handle_offer(
        &self,
        conn_id: ConnectionId,
        msg: ClientMessage,
        now: u64,
    ) -> crate::error::Result<()> {
        let ClientMessage::Offer { room, .. } = &msg else {
            unreachable!("handle_offer called with non-offer message");
        };
        let room = required_room(room.clone())?;

        if !self.registry.is_active_at(&room, now).await {
            return Err(CoordinatorError::InvalidOrInactiveRoom(room));
        }
        let sender = self
            .registry
            .participant(&room, conn_id)
            .await
            .ok_or_else(|| CoordinatorError::NotInRoom(room.clone()))?;
        let host = self
            .registry
            .host_of(&room)
            .await
            .ok_or_else(|| CoordinatorError::InvalidOrInactiveRoom(room.clone()))?;
        if sender.username != host {
            return Err(CoordinatorError::OnlyHostCanStart(room));
        }

        self.relay_to_others(&room, conn_id, &msg).await
    }

    /// `answer` and `ice-candidate` are relayed with a liveness check but
    /// deliberately no membership or host check, unlike `offer`. Known
    /// asymmetry, kept as-is pending a product decision.
    async fn handle_relay(
        &self,
        conn_id: ConnectionId,
        msg: ClientMessage,
        now: u64,
    ) -> crate::error::Result<()> {
        let room = match &msg {
            ClientMessage::Answer { room, .. } | ClientMessage::IceCandidate { room, .. } => {
                room.clone().unwrap_or_default()
            }
            _ => unreachable!("handle_relay called with non-relay message"),
        };

        if !self.registry.is_active_at(&room, now).await {
            return Err(CoordinatorError::InvalidOrInactiveRoom(room));
        }
        self.relay_to_others(&room, conn_id, &msg).await
    }

    /// Chat goes to the entire room, the sender included, with a server
    /// timestamp stamped in when the caller omits one.
    async fn handle_chat(
        &self,
        room: Option<String>,
        username: Option<String>,
        message: Option<String>,
        ts: Option<u64>,
        now: u64,
    ) -> crate::error::Result<()> {
        let room = room.unwrap_or_default();
        if !self.registry.is_active_at(&room, now).await {
            return Err(CoordinatorError::InvalidOrInactiveRoom(room));
        }

        let members = self.registry.member_ids(&room).await;
        self.broadcast(
            &members,
            &ServerMessage::ChatMessage {
                username,
                message: message.unwrap_or_default(),
                ts: ts.unwrap_or(now),
            },
        )
        .await;
        Ok(())
    }

    async fn handle_participants_request(
        &self,
        conn_id: ConnectionId,
        room: Option<String>,
        now: u64,
    ) -> crate::error::Result<()> {
        let Some(room) = room.filter(|r| !r.is_empty()) else {
            return Ok(());
        };
        if !self.registry.is_active_at(&room, now).await {
            return Err(CoordinatorError::InvalidOrInactiveRoom(room));
        }

        let list = self.registry.participants(&room).await;
        self.send(conn_id, &ServerMessage::Participants { list })
            .await;
        Ok(())
    }

    /// Relay a raw signaling payload to every room member except the sender.
    async fn relay_to_others(
        &self,
        room: &str,
        sender_id: ConnectionId,
        msg: &ClientMessage,
    ) -> crate::error::Result<()> {
        let targets: Vec<ConnectionId> = self
            .registry
            .member_ids(room)
            .await
            .into_iter()
            .filter(|id| *id != sender_id)
            .collect();
        self.broadcast(&targets, msg).await;
        Ok(())
    }

    /// Called by the meeting-end path to notify the room before the HTTP
    /// response is returned, so ending and notifying stay one operation.
    pub async fn notify_meeting_ended(&self, code: &str, members: &[ConnectionId]) {
        self.broadcast(
            members,
            &ServerMessage::MeetingEnded {
                code: code.to_string(),
            },
        )
        .await;
    }

    async fn send<T: Serialize>(&self, conn_id: ConnectionId, msg: &T) {
        self.broadcast(&[conn_id], msg).await;
    }

    /// Serialize once, deliver to each target. A target that disconnected
    /// mid-broadcast is silently dropped.
    async fn broadcast<T: Serialize>(&self, targets: &[ConnectionId], msg: &T) {
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize outbound signaling message");
                return;
            }
        };

        let senders = self.senders.read().await;
        for conn_id in targets {
            if let Some(tx) = senders.get(conn_id) {
                let _ = tx.send(Message::text(text.clone()));
            }
        }
    }
}

fn required_room(room: Option<String>) -> crate::error::Result<String> {
    room.filter(|r| !r.is_empty())
        .ok_or(CoordinatorError::MissingRoomCode)
}
