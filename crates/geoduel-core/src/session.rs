//! Session registry: the live record of every connected user.
//!
//! The registry maintains a bidirectional mapping between user ids and
//! connection handles (session ids):
//!
//! - `user -> session`: lookups, location updates, duplicate-login eviction
//! - `session -> user`: cleanup on disconnect
//!
//! # Design
//!
//! - Last writer wins: registering a user id that already has a live
//!   session evicts the old session and surfaces its handle so the driver
//!   can force the stale connection closed.
//! - Narrow contract: only the room lifecycle manager mutates room
//!   references, only the message relay mutates the message flag, and no
//!   other component mutates a session at all.

use std::collections::HashMap;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// The live server-side record of one connected user.
#[derive(Debug, Clone)]
pub struct Session {
    session_id: u64,
    user_id: u64,
    location: Option<Location>,
    room: Option<u128>,
    has_recent_message: bool,
}

impl Session {
    fn new(session_id: u64, user_id: u64) -> Self {
        Self { session_id, user_id, location: None, room: None, has_recent_message: false }
    }

    /// Connection handle this session is bound to.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Stable user identifier.
    #[must_use]
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Last reported coordinates. `None` until the first location update.
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Id of the active room this user is in, if any.
    #[must_use]
    pub fn room(&self) -> Option<u128> {
        self.room
    }

    /// Whether an in-room message is waiting for this user.
    #[must_use]
    pub fn has_recent_message(&self) -> bool {
        self.has_recent_message
    }
}

/// Outcome of registering a user whose id already had a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictedSession {
    /// Connection handle of the replaced session; the driver must close it.
    pub session_id: u64,
    /// Room the replaced session was in, if any; the driver must run the
    /// disconnect cascade on it.
    pub room: Option<u128>,
}

/// Registry of all live sessions, keyed by user id.
///
/// # Invariants
///
/// - A user id maps to at most one live session.
/// - A session id maps to at most one user id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// User id -> session
    sessions: HashMap<u64, Session>,
    /// Session id -> user id
    users_by_session: HashMap<u64, u64>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the session for a user.
    ///
    /// Last writer wins: if the user already has a live session, it is
    /// replaced and the evicted connection handle (plus any room it was in)
    /// is returned so the caller can force the old connection closed and
    /// tear the room down.
    pub fn register(&mut self, session_id: u64, user_id: u64) -> Option<EvictedSession> {
        let prior = self.sessions.insert(user_id, Session::new(session_id, user_id));
        self.users_by_session.insert(session_id, user_id);

        prior.and_then(|old| {
            if old.session_id == session_id {
                // Same handle re-registering; nothing to evict.
                return None;
            }
            self.users_by_session.remove(&old.session_id);
            Some(EvictedSession { session_id: old.session_id, room: old.room })
        })
    }

    /// Remove the session bound to a connection handle.
    ///
    /// Returns the user id and the room the session referenced (if any) so
    /// the caller can trigger room teardown. `None` if the handle is
    /// unknown or was already evicted by a newer login.
    pub fn unregister(&mut self, session_id: u64) -> Option<(u64, Option<u128>)> {
        let user_id = self.users_by_session.remove(&session_id)?;
        let session = self.sessions.remove(&user_id)?;

        debug_assert_eq!(session.session_id, session_id);

        Some((user_id, session.room))
    }

    /// Look up a session by user id.
    #[must_use]
    pub fn get(&self, user_id: u64) -> Option<&Session> {
        self.sessions.get(&user_id)
    }

    /// Connection handle for a user. `None` if the user is offline.
    #[must_use]
    pub fn session_id_for_user(&self, user_id: u64) -> Option<u64> {
        self.sessions.get(&user_id).map(Session::session_id)
    }

    /// User bound to a connection handle.
    #[must_use]
    pub fn user_for_session(&self, session_id: u64) -> Option<u64> {
        self.users_by_session.get(&session_id).copied()
    }

    /// Update a user's stored location and return the refreshed session.
    ///
    /// Silent no-op (`None`) if the user id is unknown - an update racing a
    /// disconnect is dropped, not an error.
    pub fn update_location(&mut self, user_id: u64, lat: f64, lon: f64) -> Option<&Session> {
        let session = self.sessions.get_mut(&user_id)?;
        session.location = Some(Location { lat, lon });
        Some(session)
    }

    /// Set or clear a user's room reference.
    ///
    /// Reserved for the room lifecycle manager. Returns `false` if the user
    /// has no live session.
    pub fn set_room(&mut self, user_id: u64, room: Option<u128>) -> bool {
        match self.sessions.get_mut(&user_id) {
            Some(session) => {
                session.room = room;
                true
            },
            None => false,
        }
    }

    /// Set or clear a user's unread-message flag.
    ///
    /// Reserved for the message relay. Returns `false` if the user has no
    /// live session.
    pub fn set_message_flag(&mut self, user_id: u64, flagged: bool) -> bool {
        match self.sessions.get_mut(&user_id) {
            Some(session) => {
                session.has_recent_message = flagged;
                true
            },
            None => false,
        }
    }

    /// Connection handles of every live session (location fan-out targets).
    pub fn session_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.sessions.values().map(Session::session_id)
    }

    /// All live sessions.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut registry = SessionRegistry::new();

        assert!(registry.register(100, 1).is_none());

        let session = registry.get(1).unwrap();
        assert_eq!(session.session_id(), 100);
        assert_eq!(session.user_id(), 1);
        assert_eq!(session.location(), None);
        assert_eq!(session.room(), None);
        assert!(!session.has_recent_message());

        assert_eq!(registry.session_id_for_user(1), Some(100));
        assert_eq!(registry.user_for_session(100), Some(1));
    }

    #[test]
    fn duplicate_login_evicts_old_session() {
        let mut registry = SessionRegistry::new();

        registry.register(100, 1);
        registry.set_room(1, Some(0xAB));

        let evicted = registry.register(200, 1).unwrap();
        assert_eq!(evicted.session_id, 100);
        assert_eq!(evicted.room, Some(0xAB));

        // New session wins; old handle no longer resolves.
        assert_eq!(registry.session_id_for_user(1), Some(200));
        assert_eq!(registry.user_for_session(100), None);
        assert_eq!(registry.user_for_session(200), Some(1));
        assert_eq!(registry.len(), 1);

        // The replacement session starts fresh.
        assert_eq!(registry.get(1).unwrap().room(), None);
    }

    #[test]
    fn unregister_returns_room_reference() {
        let mut registry = SessionRegistry::new();

        registry.register(100, 1);
        registry.set_room(1, Some(0xCD));

        let (user_id, room) = registry.unregister(100).unwrap();
        assert_eq!(user_id, 1);
        assert_eq!(room, Some(0xCD));

        assert!(registry.get(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_stale_handle_is_noop() {
        let mut registry = SessionRegistry::new();

        registry.register(100, 1);
        registry.register(200, 1); // evicts handle 100

        // The old connection closing later must not remove the new session.
        assert!(registry.unregister(100).is_none());
        assert_eq!(registry.session_id_for_user(1), Some(200));
    }

    #[test]
    fn update_location_unknown_user_is_silent_noop() {
        let mut registry = SessionRegistry::new();

        assert!(registry.update_location(99, 1.0, 2.0).is_none());
    }

    #[test]
    fn update_location_stores_coordinates() {
        let mut registry = SessionRegistry::new();
        registry.register(100, 1);

        let session = registry.update_location(1, 37.5665, 126.9780).unwrap();
        assert_eq!(session.location(), Some(Location { lat: 37.5665, lon: 126.9780 }));

        // Repeated identical updates are accepted, not deduplicated.
        assert!(registry.update_location(1, 37.5665, 126.9780).is_some());
    }

    #[test]
    fn message_flag_round_trip() {
        let mut registry = SessionRegistry::new();
        registry.register(100, 1);

        assert!(registry.set_message_flag(1, true));
        assert!(registry.get(1).unwrap().has_recent_message());

        assert!(registry.set_message_flag(1, false));
        assert!(!registry.get(1).unwrap().has_recent_message());

        assert!(!registry.set_message_flag(2, true));
    }

    #[test]
    fn session_ids_covers_all_users() {
        let mut registry = SessionRegistry::new();
        registry.register(100, 1);
        registry.register(200, 2);
        registry.register(300, 3);

        let mut ids: Vec<_> = registry.session_ids().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![100, 200, 300]);
    }
}
