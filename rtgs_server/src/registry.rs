//! Session registry.
//!
//! Maps a transport endpoint to its `Session`. All access goes through one
//! reader/writer lock; no method holds it across an await point, and every
//! read hands back owned copies.

use std::{
    collections::{hash_map::Entry, HashMap},
    net::SocketAddr,
    time::Duration,
};

use parking_lot::RwLock;
use rtgs_shared::participant::Participant;
use tokio::time::Instant;

use crate::spawn::SpawnPolicy;

/// Opaque peer identity: the datagram source address.
pub type Endpoint = SocketAddr;

/// Server-side record for one peer.
#[derive(Debug, Clone)]
pub struct Session {
    pub endpoint: Endpoint,
    /// Never decreases while the session exists.
    pub last_activity_at: Instant,
    pub participant: Option<Participant>,
}

/// Concurrent endpoint -> session map.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Endpoint, Session>>,
    spawner: SpawnPolicy,
}

impl SessionRegistry {
    pub fn new(spawner: SpawnPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            spawner,
        }
    }

    pub fn spawner(&self) -> &SpawnPolicy {
        &self.spawner
    }

    /// Returns the session for `endpoint`, creating and spawning it first if
    /// absent. The flag is `true` only for the call that created it.
    pub fn register_if_absent(&self, endpoint: Endpoint) -> (Session, bool) {
        if let Some(s) = self.sessions.read().get(&endpoint) {
            return (s.clone(), false);
        }

        let mut sessions = self.sessions.write();
        // Another writer may have won between the two locks.
        if let Some(s) = sessions.get(&endpoint) {
            return (s.clone(), false);
        }
        let session = Session {
            endpoint,
            last_activity_at: Instant::now(),
            participant: Some(self.spawner.spawn(&endpoint.to_string())),
        };
        sessions.insert(endpoint, session.clone());
        (session, true)
    }

    /// Creates-or-refreshes under one write lock, so an eviction pass cannot
    /// land between registration and refresh. The flag is `true` only for the
    /// call that created the session.
    pub fn observe(&self, endpoint: Endpoint) -> (Session, bool) {
        let now = Instant::now();
        match self.sessions.write().entry(endpoint) {
            Entry::Occupied(mut e) => {
                let s = e.get_mut();
                s.last_activity_at = s.last_activity_at.max(now);
                (s.clone(), false)
            }
            Entry::Vacant(v) => {
                let s = v.insert(Session {
                    endpoint,
                    last_activity_at: now,
                    participant: Some(self.spawner.spawn(&endpoint.to_string())),
                });
                (s.clone(), true)
            }
        }
    }

    /// Refreshes activity for a known endpoint. Unknown endpoints are ignored;
    /// returns whether a session was touched.
    pub fn touch(&self, endpoint: Endpoint) -> bool {
        let now = Instant::now();
        match self.sessions.write().get_mut(&endpoint) {
            Some(s) => {
                s.last_activity_at = s.last_activity_at.max(now);
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of every spawned participant, ordered by id.
    pub fn snapshot(&self) -> Vec<Participant> {
        self.snapshot_with_endpoints().0
    }

    /// Endpoints currently registered, ordered.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut out: Vec<Endpoint> = self.sessions.read().keys().copied().collect();
        out.sort();
        out
    }

    /// Participants and endpoints taken under the same read lock.
    pub fn snapshot_with_endpoints(&self) -> (Vec<Participant>, Vec<Endpoint>) {
        let sessions = self.sessions.read();
        let mut participants: Vec<Participant> = sessions
            .values()
            .filter_map(|s| s.participant.clone())
            .collect();
        let mut endpoints: Vec<Endpoint> = sessions.keys().copied().collect();
        drop(sessions);

        participants.sort_by(|a, b| a.id.cmp(&b.id));
        endpoints.sort();
        (participants, endpoints)
    }

    /// Copies of all sessions, ordered by endpoint.
    pub fn sessions(&self) -> Vec<Session> {
        let mut out: Vec<Session> = self.sessions.read().values().cloned().collect();
        out.sort_by_key(|s| s.endpoint);
        out
    }

    /// Removes every session silent for longer than `timeout` and returns the
    /// removed endpoints.
    pub fn evict(&self, timeout: Duration) -> Vec<Endpoint> {
        let now = Instant::now();
        let mut removed = Vec::new();
        self.sessions.write().retain(|endpoint, s| {
            let keep = now.saturating_duration_since(s.last_activity_at) <= timeout;
            if !keep {
                removed.push(*endpoint);
            }
            keep
        });
        removed.sort();
        removed
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.sessions.read().contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
