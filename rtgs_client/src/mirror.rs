//! Client mirror.
//!
//! Local copy of participant state, merged from inbound `world_update`
//! snapshots. Each entry is replaced wholesale by the latest snapshot that
//! mentions its id (last write wins, including reordered datagrams).
//!
//! The protocol carries no removal signal, so entries are kept until the
//! caller removes or prunes them.

use std::{collections::HashMap, time::Duration};

use parking_lot::RwLock;
use rtgs_shared::{
    math::Vec3d,
    net::{decode_server_message, ServerMessage, UserUpdate, WorldUpdate},
    participant::ParticipantKind,
};
use tokio::time::Instant;
use tracing::{debug, warn};

pub type Rgb = [u8; 3];

/// Fixed kind -> color mapping used for display.
pub fn display_color(kind: &ParticipantKind) -> Rgb {
    match kind {
        ParticipantKind::Player => [0, 255, 100],
        ParticipantKind::Bot => [255, 150, 0],
        ParticipantKind::Admin => [255, 50, 50],
        ParticipantKind::Unknown(_) => [150, 150, 150],
    }
}

/// One mirrored participant.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntry {
    pub id: String,
    pub kind: ParticipantKind,
    pub location: Vec3d,
    pub orientation: f32,
    pub active: bool,
    /// Local receipt time.
    pub received_at: Instant,
    pub color: Rgb,
}

impl MirrorEntry {
    fn from_wire(u: &UserUpdate, received_at: Instant) -> Self {
        Self {
            id: u.id.clone(),
            kind: u.user_type.clone(),
            location: Vec3d::from(u.location),
            orientation: u.orientation,
            active: u.is_active,
            received_at,
            color: display_color(&u.user_type),
        }
    }
}

/// Participant id -> entry.
#[derive(Default)]
pub struct ClientMirror {
    entries: RwLock<HashMap<String, MirrorEntry>>,
}

impl ClientMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites one entry per user in `update`.
    pub fn apply_snapshot(&self, update: &WorldUpdate) -> usize {
        let now = Instant::now();
        let fresh: Vec<MirrorEntry> = update
            .users
            .iter()
            .map(|u| MirrorEntry::from_wire(u, now))
            .collect();

        let mut entries = self.entries.write();
        for e in fresh {
            entries.insert(e.id.clone(), e);
        }
        update.users.len()
    }

    /// Decodes and applies one server datagram. Returns the number of entries
    /// applied, or `None` when the datagram was dropped or ignored.
    pub fn apply_datagram(&self, payload: &[u8]) -> Option<usize> {
        match decode_server_message(payload) {
            Ok(ServerMessage::WorldUpdate(update)) => {
                let n = self.apply_snapshot(&update);
                debug!(users = n, "World updated");
                Some(n)
            }
            Ok(ServerMessage::Other { kind }) => {
                debug!(%kind, "Ignoring message kind");
                None
            }
            Err(e) => {
                warn!(error = %e, len = payload.len(), "Dropping undecodable datagram");
                None
            }
        }
    }

    /// Copy of all entries, ordered by id.
    pub fn list(&self) -> Vec<MirrorEntry> {
        let mut out: Vec<MirrorEntry> = self.entries.read().values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn list_by_kind(&self, kind: &ParticipantKind) -> Vec<MirrorEntry> {
        let mut out: Vec<MirrorEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| &e.kind == kind)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn get(&self, id: &str) -> Option<MirrorEntry> {
        self.entries.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<MirrorEntry> {
        self.entries.write().remove(id)
    }

    /// Drops entries not refreshed within `max_age`; returns their ids.
    pub fn prune_stale(&self, max_age: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut removed = Vec::new();
        self.entries.write().retain(|id, e| {
            let keep = now.saturating_duration_since(e.received_at) <= max_age;
            if !keep {
                removed.push(id.clone());
            }
            keep
        });
        removed.sort();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rtgs_shared::{
        math::Vec3,
        net::encode_world_update,
        participant::Participant,
    };

    use super::*;

    fn user(id: &str, kind: &str, loc: [f32; 3]) -> UserUpdate {
        UserUpdate {
            id: id.into(),
            user_type: ParticipantKind::from(kind),
            location: Vec3::from(loc),
            orientation: 45.5,
            is_active: true,
        }
    }

    #[test]
    fn colors_follow_kind() {
        assert_eq!(display_color(&ParticipantKind::Player), [0, 255, 100]);
        assert_eq!(display_color(&ParticipantKind::Bot), [255, 150, 0]);
        assert_eq!(display_color(&ParticipantKind::Admin), [255, 50, 50]);
        assert_eq!(
            display_color(&ParticipantKind::Unknown("ghost".into())),
            [150, 150, 150]
        );
    }

    #[test]
    fn snapshot_creates_entries_with_widened_fields() {
        let mirror = ClientMirror::new();
        let n = mirror.apply_snapshot(&WorldUpdate {
            users: vec![user("a", "player", [1.5, 0.0, 9.0]), user("b", "bot", [0.0; 3])],
        });
        assert_eq!(n, 2);

        let a = mirror.get("a").unwrap();
        assert_eq!(a.location, Vec3d::new(1.5, 0.0, 9.0));
        assert_eq!(a.orientation, 45.5);
        assert_eq!(a.color, [0, 255, 100]);
        assert_eq!(mirror.list_by_kind(&ParticipantKind::Bot).len(), 1);
    }

    #[test]
    fn later_snapshot_overwrites_wholesale() {
        let mirror = ClientMirror::new();
        mirror.apply_snapshot(&WorldUpdate {
            users: vec![user("a", "player", [1.0, 0.0, 1.0])],
        });
        let mut second = user("a", "admin", [2.0, 0.0, 3.0]);
        second.is_active = false;
        mirror.apply_snapshot(&WorldUpdate {
            users: vec![second],
        });

        let a = mirror.get("a").unwrap();
        assert_eq!(a.location, Vec3d::new(2.0, 0.0, 3.0));
        assert_eq!(a.kind, ParticipantKind::Admin);
        assert_eq!(a.color, [255, 50, 50]);
        assert!(!a.active);
        assert_eq!(mirror.len(), 1);
    }

    #[test]
    fn absent_ids_are_kept() {
        let mirror = ClientMirror::new();
        mirror.apply_snapshot(&WorldUpdate {
            users: vec![user("a", "player", [0.0; 3])],
        });
        mirror.apply_snapshot(&WorldUpdate {
            users: vec![user("b", "player", [0.0; 3])],
        });
        let ids: Vec<_> = mirror.list().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn bad_datagrams_leave_state_untouched() {
        let mirror = ClientMirror::new();
        mirror.apply_snapshot(&WorldUpdate {
            users: vec![user("a", "player", [4.0, 0.0, 4.0])],
        });
        let before = mirror.list();

        assert_eq!(mirror.apply_datagram(b"{not json"), None);
        assert_eq!(mirror.apply_datagram(br#"{"type":"chat","users":[]}"#), None);
        assert_eq!(mirror.list(), before);
    }

    #[test]
    fn datagram_roundtrip_preserves_fields() {
        let participants = vec![
            Participant {
                id: "10.0.0.2:1".into(),
                kind: ParticipantKind::Player,
                location: Vec3::new(3.0, 0.0, 7.0),
                orientation: 359.99,
                active: true,
            },
            Participant {
                id: "10.0.0.3:1".into(),
                kind: ParticipantKind::Unknown("drone".into()),
                location: Vec3::new(-1.25, 2.5, 0.1),
                orientation: 0.0,
                active: false,
            },
        ];
        let bytes = encode_world_update(&WorldUpdate::from_participants(&participants)).unwrap();

        let mirror = ClientMirror::new();
        assert_eq!(mirror.apply_datagram(&bytes), Some(2));
        for (p, e) in participants.iter().zip(mirror.list()) {
            assert_eq!(e.id, p.id);
            assert_eq!(e.kind, p.kind);
            assert_eq!(e.location, Vec3d::from(p.location));
            assert_eq!(e.orientation, p.orientation);
            assert_eq!(e.active, p.active);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn prune_removes_only_stale_entries() {
        let mirror = ClientMirror::new();
        mirror.apply_snapshot(&WorldUpdate {
            users: vec![user("old", "player", [0.0; 3])],
        });
        tokio::time::advance(Duration::from_secs(10)).await;
        mirror.apply_snapshot(&WorldUpdate {
            users: vec![user("new", "player", [0.0; 3])],
        });
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(mirror.prune_stale(Duration::from_secs(5)), vec!["old".to_string()]);
        assert!(mirror.get("new").is_some());
        assert_eq!(mirror.remove("new").map(|e| e.id), Some("new".into()));
        assert!(mirror.is_empty());
    }
}
