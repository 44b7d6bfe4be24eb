pub mod assignment;
pub mod integrity;
pub mod registry;
pub mod relay;
pub mod signaling;

pub use assignment::AssignmentAuthority;
pub use integrity::SubmissionMonitor;
pub use registry::{ConnectionId, Participant, Room, RoomRegistry};
pub use relay::SignalingRelay;
pub use signaling::{ClientMessage, ServerMessage};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. All session timestamps use this scale;
/// time-sensitive operations also have `_at(now)` forms so tests can pin the
/// clock instead of sleeping.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
