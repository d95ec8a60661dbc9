// Copyright 2025 Justin Hu
//
// This file is part of Sweep Online.
//
// Sweep Online is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// Sweep Online is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License
// for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with Sweep Online. If not, see <https://www.gnu.org/licenses/>.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Match sessions and the registry that owns them

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Mutex, MutexGuard};
use sweep_common::{NUM_PLAYERS, ServerMessage, SessionPhase};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;
use uuid::Uuid;

use crate::engine::CaptureEngine;

/// Errors from session lifecycle operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// A fourth connection tried to bind
    #[error("game session is full")]
    SessionFull,
    /// Start was requested outside the READY phase (double starts included)
    #[error("cannot start game in state {0:?}")]
    NotReady(SessionPhase),
    /// The username is already bound to a live session
    #[error("already in a game session")]
    AlreadyInSession,
}

/// One connected player: identity plus the outbox feeding their socket
#[derive(Clone)]
pub struct PlayerConnection {
    /// Authenticated username, supplied by the identity layer
    pub username: String,
    /// Per-connection id
    pub user_id: Uuid,
    /// Channel to this player's writer task
    pub tx: UnboundedSender<ServerMessage>,
    /// Set by the explicit-ack start path
    pub ready: bool,
}

impl PlayerConnection {
    /// Create a connection record for a fresh socket
    pub fn new(username: String, user_id: Uuid, tx: UnboundedSender<ServerMessage>) -> Self {
        Self {
            username,
            user_id,
            tx,
            ready: false,
        }
    }
}

/// Mutable interior of a [`GameSession`], guarded by the session lock
pub struct SessionInner {
    /// Lifecycle phase
    pub phase: SessionPhase,
    /// Bound connections, in seat order (0..=3 of them)
    pub players: Vec<PlayerConnection>,
    /// Rule engine; present from start until teardown
    pub engine: Option<CaptureEngine>,
    started_at: Option<Instant>,
}

impl SessionInner {
    /// Bind a connection; the third binding moves the session to READY
    pub fn add_player(&mut self, player: PlayerConnection) -> Result<(), SessionError> {
        if self.players.len() >= NUM_PLAYERS {
            return Err(SessionError::SessionFull);
        }
        self.players.push(player);
        if self.players.len() == NUM_PLAYERS {
            self.phase = SessionPhase::Ready;
        }
        Ok(())
    }

    /// Unbind a connection; a running game ends when anyone leaves
    pub fn remove_player(&mut self, username: &str) {
        self.players.retain(|p| p.username != username);
        if self.phase == SessionPhase::InProgress {
            self.phase = SessionPhase::Finished;
        }
    }

    /// Seat index of a bound username
    pub fn player_index(&self, username: &str) -> Option<usize> {
        self.players.iter().position(|p| p.username == username)
    }

    /// Create the engine and begin play; fails outside READY, so starting an
    /// already-started session is an error rather than a no-op
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Ready {
            return Err(SessionError::NotReady(self.phase));
        }
        let names: [String; NUM_PLAYERS] = self
            .players
            .iter()
            .map(|p| p.username.clone())
            .collect::<Vec<_>>()
            .try_into()
            .expect("READY implies exactly three bound connections");
        let mut engine = CaptureEngine::new(names);
        engine.start_game(0);
        self.engine = Some(engine);
        self.phase = SessionPhase::InProgress;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Sweep leftover table cards into the last actor's pile and close out
    pub fn finish(&mut self) {
        if let Some(engine) = &mut self.engine {
            engine.finish_game();
        }
        self.phase = SessionPhase::Finished;
    }

    /// Time since the engine started, zero if it never did
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}

/// One match between exactly three players
pub struct GameSession {
    id: String,
    ranked: bool,
    inner: Mutex<SessionInner>,
}

impl GameSession {
    fn new(ranked: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ranked,
            inner: Mutex::new(SessionInner {
                phase: SessionPhase::Waiting,
                players: Vec::new(),
                engine: None,
                started_at: None,
            }),
        }
    }

    /// Unique session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this match formed from the ranked queue
    pub fn ranked(&self) -> bool {
        self.ranked
    }

    /// Acquire the session lock; all reads and writes of match state go
    /// through here, serializing concurrent messages for the same session
    pub fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock()
    }
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, Arc<GameSession>>,
    by_user: HashMap<String, String>,
}

/// Owner of all live sessions, indexed by id and by bound username
///
/// Both maps sit behind one lock so creation and teardown update them
/// together; a partial removal can never leave a dangling username entry.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    /// Create and register an empty session
    pub fn create(&self, ranked: bool) -> Arc<GameSession> {
        let session = Arc::new(GameSession::new(ranked));
        self.inner
            .lock()
            .sessions
            .insert(session.id().to_string(), Arc::clone(&session));
        info!(session = session.id(), ranked, "created game session");
        session
    }

    /// Look up a session by id
    pub fn get(&self, session_id: &str) -> Option<Arc<GameSession>> {
        self.inner.lock().sessions.get(session_id).cloned()
    }

    /// Look up the session a username is bound to
    pub fn find_by_user(&self, username: &str) -> Option<Arc<GameSession>> {
        let inner = self.inner.lock();
        let session_id = inner.by_user.get(username)?;
        inner.sessions.get(session_id).cloned()
    }

    /// Bind a connection to a session and record the username mapping
    ///
    /// At most one live session per username; a fourth binding is refused by
    /// the session itself.
    pub fn bind(&self, session: &Arc<GameSession>, player: PlayerConnection) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.by_user.contains_key(&player.username) {
            return Err(SessionError::AlreadyInSession);
        }
        let username = player.username.clone();
        session.lock().add_player(player)?;
        inner.by_user.insert(username.clone(), session.id().to_string());
        info!(player = %username, session = session.id(), "bound player to session");
        Ok(())
    }

    /// Unbind one username from its session, dropping the session once empty;
    /// returns the session it was bound to
    pub fn unbind(&self, username: &str) -> Option<Arc<GameSession>> {
        let mut inner = self.inner.lock();
        let session_id = inner.by_user.remove(username)?;
        let session = inner.sessions.get(&session_id).cloned()?;
        let now_empty = {
            let mut guard = session.lock();
            guard.remove_player(username);
            guard.players.is_empty()
        };
        if now_empty {
            inner.sessions.remove(&session_id);
            info!(session = %session_id, "removed empty session");
        }
        Some(session)
    }

    /// Tear down a session: remove it and every one of its username mappings
    /// in one step
    pub fn remove(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.sessions.remove(session_id) {
            for player in &session.lock().players {
                inner.by_user.remove(&player.username);
            }
            info!(session = session_id, "session torn down");
        }
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Number of usernames bound to live sessions
    pub fn player_count(&self) -> usize {
        self.inner.lock().by_user.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_player(name: &str) -> PlayerConnection {
        let (tx, _rx) = mpsc::unbounded_channel();
        PlayerConnection::new(name.to_string(), Uuid::new_v4(), tx)
    }

    #[test]
    fn test_third_binding_makes_session_ready() {
        let registry = SessionRegistry::default();
        let session = registry.create(false);

        registry.bind(&session, test_player("a")).unwrap();
        registry.bind(&session, test_player("b")).unwrap();
        assert_eq!(session.lock().phase, SessionPhase::Waiting);

        registry.bind(&session, test_player("c")).unwrap();
        assert_eq!(session.lock().phase, SessionPhase::Ready);
    }

    #[test]
    fn test_fourth_binding_rejected() {
        let registry = SessionRegistry::default();
        let session = registry.create(false);
        for name in ["a", "b", "c"] {
            registry.bind(&session, test_player(name)).unwrap();
        }
        assert!(matches!(
            registry.bind(&session, test_player("d")),
            Err(SessionError::SessionFull)
        ));
        // The failed binding must not leave a username mapping behind
        assert!(registry.find_by_user("d").is_none());
    }

    #[test]
    fn test_one_session_per_username() {
        let registry = SessionRegistry::default();
        let first = registry.create(false);
        let second = registry.create(false);
        registry.bind(&first, test_player("a")).unwrap();
        assert!(matches!(
            registry.bind(&second, test_player("a")),
            Err(SessionError::AlreadyInSession)
        ));
    }

    #[test]
    fn test_start_requires_ready_and_rejects_double_start() {
        let registry = SessionRegistry::default();
        let session = registry.create(false);
        assert!(matches!(
            session.lock().start(),
            Err(SessionError::NotReady(SessionPhase::Waiting))
        ));

        for name in ["a", "b", "c"] {
            registry.bind(&session, test_player(name)).unwrap();
        }
        session.lock().start().unwrap();
        assert_eq!(session.lock().phase, SessionPhase::InProgress);
        assert!(session.lock().engine.is_some());

        assert!(matches!(
            session.lock().start(),
            Err(SessionError::NotReady(SessionPhase::InProgress))
        ));
    }

    #[test]
    fn test_lookup_by_username() {
        let registry = SessionRegistry::default();
        let session = registry.create(true);
        registry.bind(&session, test_player("a")).unwrap();

        let found = registry.find_by_user("a").unwrap();
        assert_eq!(found.id(), session.id());
        assert!(found.ranked());
        assert!(registry.find_by_user("nobody").is_none());
    }

    #[test]
    fn test_teardown_clears_both_maps() {
        let registry = SessionRegistry::default();
        let session = registry.create(false);
        for name in ["a", "b", "c"] {
            registry.bind(&session, test_player(name)).unwrap();
        }
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.player_count(), 3);

        registry.remove(session.id());
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.player_count(), 0);
        assert!(registry.find_by_user("a").is_none());
    }

    #[test]
    fn test_unbind_drops_empty_session() {
        let registry = SessionRegistry::default();
        let session = registry.create(false);
        registry.bind(&session, test_player("a")).unwrap();
        registry.bind(&session, test_player("b")).unwrap();

        registry.unbind("a");
        assert_eq!(registry.session_count(), 1);
        registry.unbind("b");
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_remove_player_ends_running_game() {
        let registry = SessionRegistry::default();
        let session = registry.create(false);
        for name in ["a", "b", "c"] {
            registry.bind(&session, test_player(name)).unwrap();
        }
        session.lock().start().unwrap();

        session.lock().remove_player("b");
        assert_eq!(session.lock().phase, SessionPhase::Finished);
    }
}
