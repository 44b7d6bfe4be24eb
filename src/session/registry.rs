use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CoordinatorError;
use crate::session::now_ms;

/// Opaque identifier for one live signaling connection. Unique per
/// connection for the lifetime of the process.
pub type ConnectionId = u64;

/// Room codes are drawn from uppercase letters and digits with the
/// ambiguous glyphs O, 0, I, 1 removed so hosts can read codes aloud.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 6;

/// Collision retries before giving up. The code space (32^6) dwarfs any
/// realistic number of concurrent rooms, so hitting this cap means
/// something is badly wrong rather than bad luck.
const MAX_CODE_RETRIES: u32 = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub code: String,
    pub host: String,
    pub created_at: u64,
    pub expires_at: Option<u64>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub username: String,
    pub role: String,
}

struct RoomEntry {
    room: Room,
    members: HashMap<ConnectionId, Participant>,
}

/// Tracks meeting existence, host identity, expiry and the live
/// participant mapping. All mutations go through one registry-wide write
/// lock; member snapshots for fan-out are taken under the same lock so a
/// broadcast never races a membership change for the same event.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, RoomEntry>>,
}

impl RoomRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
        })
    }

    fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    /// True if `code` is syntactically a room code (right length, right
    /// alphabet). Says nothing about whether the room exists.
    pub fn is_well_formed_code(code: &str) -> bool {
        code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
    }

    /// Create a room with a fresh unique code and an empty member mapping.
    pub async fn create_room(&self, host: String, duration_minutes: u64) -> crate::error::Result<Room> {
        self.create_room_at(host, duration_minutes, now_ms()).await
    }

    pub async fn create_room_at(
        &self,
        host: String,
        duration_minutes: u64,
        now: u64,
    ) -> crate::error::Result<Room> {
        let mut rooms = self.rooms.write().await;

        let mut code = Self::generate_code();
        let mut retries = 0;
        while rooms.contains_key(&code) {
            retries += 1;
            if retries >= MAX_CODE_RETRIES {
                return Err(CoordinatorError::CapacityExceeded(retries));
            }
            code = Self::generate_code();
        }

        let expires_at = now + duration_minutes.max(1) * 60 * 1000;
        let room = Room {
            code: code.clone(),
            host,
            created_at: now,
            expires_at: Some(expires_at),
            active: true,
        };

        rooms.insert(
            code.clone(),
            RoomEntry {
                room: room.clone(),
                members: HashMap::new(),
            },
        );

        tracing::info!(room = %code, host = %room.host, expires_at, "Meeting created");
        Ok(room)
    }

    pub async fn get_room(&self, code: &str) -> Option<Room> {
        let rooms = self.rooms.read().await;
        rooms.get(code).map(|e| e.room.clone())
    }

    /// Derived liveness: the `active` flag alone is never trusted, expiry
    /// is checked lazily on every read.
    pub async fn is_active(&self, code: &str) -> bool {
        self.is_active_at(code, now_ms()).await
    }

    pub async fn is_active_at(&self, code: &str, now: u64) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(code)
            .map(|e| Self::entry_active_at(&e.room, now))
            .unwrap_or(false)
    }

    fn entry_active_at(room: &Room, now: u64) -> bool {
        room.active && room.expires_at.map_or(true, |exp| now < exp)
    }

    /// End a meeting. Only the recorded host may end it; `None` for the
    /// requester skips the identity check (trusted internal callers).
    /// Returns the member snapshot so the caller can notify the room.
    pub async fn end_room(
        &self,
        code: &str,
        requesting_username: Option<&str>,
    ) -> crate::error::Result<Vec<ConnectionId>> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms
            .get_mut(code)
            .ok_or_else(|| CoordinatorError::RoomNotFound(code.to_string()))?;

        if let Some(requester) = requesting_username {
            if requester != entry.room.host {
                return Err(CoordinatorError::Forbidden(format!(
                    "{} is not the host of {}",
                    requester, code
                )));
            }
        }

        entry.room.active = false;
        tracing::info!(room = %code, "Meeting ended");
        Ok(entry.members.keys().copied().collect())
    }

    /// Register a participant. Returns the connection ids of the other
    /// members at join time, for the `peer-joined` broadcast.
    pub async fn join_at(
        &self,
        code: &str,
        conn_id: ConnectionId,
        participant: Participant,
        now: u64,
    ) -> crate::error::Result<Vec<ConnectionId>> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms
            .get_mut(code)
            .filter(|e| Self::entry_active_at(&e.room, now))
            .ok_or_else(|| CoordinatorError::InvalidOrInactiveRoom(code.to_string()))?;

        let others: Vec<ConnectionId> = entry.members.keys().copied().collect();
        entry.members.insert(conn_id, participant);
        Ok(others)
    }

    /// Remove a participant explicitly. Returns the removed record and the
    /// remaining members for the `peer-left` broadcast.
    pub async fn leave_at(
        &self,
        code: &str,
        conn_id: ConnectionId,
        now: u64,
    ) -> crate::error::Result<(Option<Participant>, Vec<ConnectionId>)> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms
            .get_mut(code)
            .filter(|e| Self::entry_active_at(&e.room, now))
            .ok_or_else(|| CoordinatorError::InvalidOrInactiveRoom(code.to_string()))?;

        let removed = entry.members.remove(&conn_id);
        Ok((removed, entry.members.keys().copied().collect()))
    }

    /// Connection-loss cleanup: remove `conn_id` from every room it had
    /// joined, regardless of room liveness. One entry per affected room:
    /// (code, departing participant, remaining members).
    pub async fn disconnect(
        &self,
        conn_id: ConnectionId,
    ) -> Vec<(String, Participant, Vec<ConnectionId>)> {
        let mut rooms = self.rooms.write().await;
        let mut departed = Vec::new();

        for (code, entry) in rooms.iter_mut() {
            if let Some(participant) = entry.members.remove(&conn_id) {
                departed.push((
                    code.clone(),
                    participant,
                    entry.members.keys().copied().collect(),
                ));
            }
        }

        departed
    }

    pub async fn host_of(&self, code: &str) -> Option<String> {
        let rooms = self.rooms.read().await;
        rooms.get(code).map(|e| e.room.host.clone())
    }

    pub async fn is_member(&self, code: &str, conn_id: ConnectionId) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(code)
            .map(|e| e.members.contains_key(&conn_id))
            .unwrap_or(false)
    }

    pub async fn participant(&self, code: &str, conn_id: ConnectionId) -> Option<Participant> {
        let rooms = self.rooms.read().await;
        rooms.get(code).and_then(|e| e.members.get(&conn_id).cloned())
    }

    pub async fn participants(&self, code: &str) -> Vec<Participant> {
        let rooms = self.rooms.read().await;
        rooms
            .get(code)
            .map(|e| e.members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every member's connection id, the sender included.
    pub async fn member_ids(&self, code: &str) -> Vec<ConnectionId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(code)
            .map(|e| e.members.keys().copied().collect())
            .unwrap_or_default()
    }
}
