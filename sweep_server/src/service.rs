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

//! Protocol boundary: inbound intents in, snapshots and errors out

use std::{collections::HashSet, sync::Arc, time::Duration};

use parking_lot::Mutex;
use sweep_common::{
    ClientMessage, GameSnapshot, NUM_PLAYERS, PlayerSnapshot, QueueState, ServerMessage,
    SessionPhase,
};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use uuid::Uuid;

use crate::matchmaking::{MatchOutcome, MatchmakingQueue};
use crate::session::{GameSession, PlayerConnection, SessionError, SessionInner, SessionRegistry};

/// Errors reported to the offending connection only; session state is left
/// untouched when any of these fire
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Username already has a live connection
    #[error("username already connected")]
    UsernameTaken,
    /// Sender is not bound to any session
    #[error("not in a game session")]
    NotInSession,
    /// Session exists but is not in progress
    #[error("game is not active")]
    GameNotActive,
    /// Sender is not the engine's current player
    #[error("not your turn")]
    NotYourTurn,
    /// Hand index does not resolve against the sender's hand
    #[error("hand card index out of range")]
    HandIndexOutOfRange,
    /// A table index does not resolve against the current table
    #[error("table card index out of range")]
    TableIndexOutOfRange,
    /// Session lifecycle violation
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Terminal record of one match, handed to the external persistence
/// collaborator; never read back
#[derive(Debug, Clone)]
pub struct MatchSummary {
    /// Session that finished
    pub session_id: String,
    /// Queue mode the match formed from
    pub ranked: bool,
    /// Username and final score (points + sweeps) per seat
    pub players: Vec<(String, u32)>,
    /// Winning username; absent when the match was cut short by a disconnect
    pub winner: Option<String>,
    /// Wall-clock match length
    pub duration: Duration,
}

/// The composition root's service instance: owns the registry, the queues,
/// and the set of live connections
pub struct GameService {
    registry: Arc<SessionRegistry>,
    queue: MatchmakingQueue,
    online: Mutex<HashSet<String>>,
    summary_tx: UnboundedSender<MatchSummary>,
    auto_start: bool,
}

impl GameService {
    /// A service emitting match summaries on `summary_tx`
    ///
    /// With `auto_start`, a formed match begins immediately; otherwise it
    /// waits in READY for all three ready acknowledgements.
    pub fn new(summary_tx: UnboundedSender<MatchSummary>, auto_start: bool) -> Self {
        let registry = Arc::new(SessionRegistry::default());
        Self {
            queue: MatchmakingQueue::new(Arc::clone(&registry)),
            registry,
            online: Mutex::new(HashSet::new()),
            summary_tx,
            auto_start,
        }
    }

    /// Admit a fresh connection under `username`; refuses a second live
    /// connection for the same name
    pub fn register(
        &self,
        username: &str,
        tx: UnboundedSender<ServerMessage>,
    ) -> Result<PlayerConnection, ServiceError> {
        let mut online = self.online.lock();
        if !online.insert(username.to_string()) {
            return Err(ServiceError::UsernameTaken);
        }
        info!(player = %username, "connection registered");
        Ok(PlayerConnection::new(
            username.to_string(),
            Uuid::new_v4(),
            tx,
        ))
    }

    /// Drop a connection: run the disconnect path and free the username
    pub fn unregister(&self, connection: &PlayerConnection) {
        self.disconnect(&connection.username);
        self.online.lock().remove(&connection.username);
    }

    /// Dispatch one inbound intent, replying to the sender with a targeted
    /// error when it is rejected
    pub fn handle_message(&self, connection: &PlayerConnection, message: ClientMessage) {
        let result = match message {
            ClientMessage::JoinQueue { ranked } => self.join_queue(connection.clone(), ranked),
            ClientMessage::LeaveQueue => {
                self.leave_queue(&connection.username);
                Ok(())
            }
            ClientMessage::PlayMove {
                hand_card_index,
                table_card_indices,
            } => self.play_move(&connection.username, hand_card_index, &table_card_indices),
            ClientMessage::Ready => self.ready(&connection.username),
        };
        if let Err(err) = result {
            warn!(player = %connection.username, %err, "rejected message");
            let _ = connection.tx.send(ServerMessage::Error {
                error: err.to_string(),
            });
        }
    }

    /// Enter a matchmaking queue; forms and (by default) starts a match the
    /// moment three players are waiting
    pub fn join_queue(&self, player: PlayerConnection, ranked: bool) -> Result<(), ServiceError> {
        if self.registry.find_by_user(&player.username).is_some() {
            return Err(SessionError::AlreadyInSession.into());
        }

        match self.queue.join(player, ranked)? {
            MatchOutcome::Matched { session } => {
                {
                    let guard = session.lock();
                    let matched = ServerMessage::QueueStatus {
                        status: QueueState::Matched,
                        queue_size: None,
                        session_id: Some(session.id().to_string()),
                    };
                    for member in &guard.players {
                        let _ = member.tx.send(matched.clone());
                    }
                }
                if self.auto_start {
                    self.start_session(&session)?;
                } else {
                    // Lineup snapshot; play begins once everyone sends ready
                    let guard = session.lock();
                    Self::broadcast(&session, &guard, None);
                }
            }
            MatchOutcome::Waiting { .. } => {
                self.broadcast_queue_update(ranked);
            }
        }
        Ok(())
    }

    /// Leave both queues and any session that has not started yet; refreshes
    /// both modes' depths since the sender's mode is not tracked here
    pub fn leave_queue(&self, username: &str) {
        self.queue.leave(username);

        if let Some(session) = self.registry.find_by_user(username) {
            let phase = session.lock().phase;
            if phase == SessionPhase::Waiting || phase == SessionPhase::Ready {
                self.registry.unbind(username);
                if let Some(session) = self.registry.get(session.id()) {
                    let guard = session.lock();
                    Self::broadcast(&session, &guard, Some(format!("{username} left the match")));
                }
            }
        }

        self.broadcast_queue_update(false);
        self.broadcast_queue_update(true);
    }

    /// Mark the sender ready; the third acknowledgement starts the match
    pub fn ready(&self, username: &str) -> Result<(), ServiceError> {
        let session = self
            .registry
            .find_by_user(username)
            .ok_or(ServiceError::NotInSession)?;

        let mut guard = session.lock();
        if let Some(index) = guard.player_index(username) {
            guard.players[index].ready = true;
        }
        let all_ready =
            guard.players.len() == NUM_PLAYERS && guard.players.iter().all(|p| p.ready);
        if all_ready && guard.phase == SessionPhase::Ready {
            guard.start()?;
            info!(session = session.id(), "all players ready, game started");
            Self::broadcast(&session, &guard, None);
        }
        Ok(())
    }

    /// Resolve and apply one move for the sender, then broadcast; handles the
    /// follow-on redeal and the end of the game
    pub fn play_move(
        &self,
        username: &str,
        hand_index: usize,
        table_indices: &[usize],
    ) -> Result<(), ServiceError> {
        let session = self
            .registry
            .find_by_user(username)
            .ok_or(ServiceError::NotInSession)?;

        // One lock for the whole move: concurrent messages for this session
        // are applied strictly one after the other
        let mut guard = session.lock();
        if guard.phase != SessionPhase::InProgress {
            return Err(ServiceError::GameNotActive);
        }
        let player_index = guard
            .player_index(username)
            .ok_or(ServiceError::NotInSession)?;

        {
            let engine = guard.engine.as_mut().ok_or(ServiceError::GameNotActive)?;
            if engine.current_player_index() != player_index {
                return Err(ServiceError::NotYourTurn);
            }

            // Indices resolve against the hand/table ordering as last
            // broadcast; nothing is mutated until they all resolve
            let card = *engine.players()[player_index]
                .hand()
                .get(hand_index)
                .ok_or(ServiceError::HandIndexOutOfRange)?;
            let mut selection = Vec::with_capacity(table_indices.len());
            for &index in table_indices {
                selection.push(
                    *engine
                        .table_cards()
                        .get(index)
                        .ok_or(ServiceError::TableIndexOutOfRange)?,
                );
            }

            engine.play_card_with_selection(player_index, card, &selection);
        }
        Self::broadcast(&session, &guard, None);

        let needs_redeal = {
            let engine = guard.engine.as_ref().expect("engine exists while in progress");
            engine.all_hands_empty() && engine.deck_len() > 0
        };
        if needs_redeal {
            guard
                .engine
                .as_mut()
                .expect("engine exists while in progress")
                .deal_new_round();
            Self::broadcast(&session, &guard, None);
        }

        let game_over = guard
            .engine
            .as_ref()
            .expect("engine exists while in progress")
            .is_game_over();
        if game_over {
            guard.finish();
            let engine = guard.engine.as_mut().expect("engine exists while in progress");
            let winner = engine
                .winner()
                .map(|index| engine.players()[index].name().to_string());
            let message = match &winner {
                Some(name) => format!("Game Over! Winner: {name}"),
                None => "Game Over!".to_string(),
            };
            let summary = Self::summarize(&session, &guard, winner);
            Self::broadcast(&session, &guard, Some(message));
            drop(guard);

            self.registry.remove(session.id());
            info!(session = session.id(), "game over, session removed");
            let _ = self.summary_tx.send(summary);
        }
        Ok(())
    }

    /// A bound connection dropped: fatal for a running match, a plain
    /// removal otherwise
    pub fn disconnect(&self, username: &str) {
        info!(player = %username, "disconnected");
        self.queue.leave(username);
        self.broadcast_queue_update(false);
        self.broadcast_queue_update(true);

        let Some(session) = self.registry.find_by_user(username) else {
            return;
        };
        let phase = session.lock().phase;
        match phase {
            SessionPhase::InProgress => self.abort_session(&session, username),
            SessionPhase::Waiting | SessionPhase::Ready => {
                self.registry.unbind(username);
                if let Some(session) = self.registry.get(session.id()) {
                    let guard = session.lock();
                    Self::broadcast(&session, &guard, Some(format!("{username} left the match")));
                }
            }
            SessionPhase::Finished => {
                self.registry.remove(session.id());
            }
        }
    }

    fn start_session(&self, session: &Arc<GameSession>) -> Result<(), ServiceError> {
        let mut guard = session.lock();
        guard.start()?;
        info!(session = session.id(), "game started");
        Self::broadcast(session, &guard, None);
        Ok(())
    }

    // No grace period and no resume: the remaining two players lose the
    // match along with the one who dropped.
    fn abort_session(&self, session: &Arc<GameSession>, username: &str) {
        let summary = {
            let mut guard = session.lock();
            if guard.phase != SessionPhase::InProgress {
                return;
            }
            guard.finish();
            let summary = Self::summarize(session, &guard, None);
            Self::broadcast(
                session,
                &guard,
                Some(format!("Game Over! {username} disconnected")),
            );
            summary
        };
        self.registry.remove(session.id());
        warn!(session = session.id(), player = %username, "match aborted by disconnect");
        let _ = self.summary_tx.send(summary);
    }

    fn broadcast_queue_update(&self, ranked: bool) {
        let waiting = self.queue.waiting_players(ranked);
        let update = ServerMessage::QueueStatus {
            status: QueueState::Waiting,
            queue_size: Some(waiting.len()),
            session_id: None,
        };
        for player in &waiting {
            let _ = player.tx.send(update.clone());
        }
    }

    /// One snapshot for all three recipients: table cards are public, hands
    /// are sizes only
    fn build_snapshot(
        session: &GameSession,
        inner: &SessionInner,
        message: Option<String>,
    ) -> GameSnapshot {
        match &inner.engine {
            Some(engine) => GameSnapshot {
                session_id: session.id().to_string(),
                game_state: inner.phase,
                current_player_index: engine.current_player_index(),
                table_cards: engine.table_cards().to_vec(),
                players: engine
                    .players()
                    .iter()
                    .enumerate()
                    .map(|(index, player)| PlayerSnapshot {
                        username: player.name().to_string(),
                        hand_size: player.hand().len(),
                        collected_size: player.collected_len(),
                        points: player.points(),
                        sweeps: player.sweeps(),
                        is_current_player: index == engine.current_player_index(),
                    })
                    .collect(),
                message,
            },
            None => GameSnapshot {
                session_id: session.id().to_string(),
                game_state: inner.phase,
                current_player_index: 0,
                table_cards: Vec::new(),
                players: inner
                    .players
                    .iter()
                    .map(|player| PlayerSnapshot {
                        username: player.username.clone(),
                        hand_size: 0,
                        collected_size: 0,
                        points: 0,
                        sweeps: 0,
                        is_current_player: false,
                    })
                    .collect(),
                message,
            },
        }
    }

    fn broadcast(session: &GameSession, inner: &SessionInner, message: Option<String>) {
        let snapshot = Self::build_snapshot(session, inner, message);
        for player in &inner.players {
            let _ = player.tx.send(ServerMessage::GameState(snapshot.clone()));
        }
    }

    fn summarize(
        session: &GameSession,
        inner: &SessionInner,
        winner: Option<String>,
    ) -> MatchSummary {
        let players = match &inner.engine {
            Some(engine) => engine
                .players()
                .iter()
                .map(|p| (p.name().to_string(), p.points() + p.sweeps()))
                .collect(),
            None => inner
                .players
                .iter()
                .map(|p| (p.username.clone(), 0))
                .collect(),
        };
        MatchSummary {
            session_id: session.id().to_string(),
            ranked: session.ranked(),
            players,
            winner,
            duration: inner.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn test_service(auto_start: bool) -> (GameService, UnboundedReceiver<MatchSummary>) {
        let (summary_tx, summary_rx) = mpsc::unbounded_channel();
        (GameService::new(summary_tx, auto_start), summary_rx)
    }

    fn connect(
        service: &GameService,
        name: &str,
    ) -> (PlayerConnection, UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = service.register(name, tx).unwrap();
        (connection, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn last_snapshot(messages: &[ServerMessage]) -> Option<&GameSnapshot> {
        messages.iter().rev().find_map(|m| match m {
            ServerMessage::GameState(snapshot) => Some(snapshot),
            _ => None,
        })
    }

    #[test]
    fn test_duplicate_username_refused() {
        let (service, _summaries) = test_service(true);
        let _first = connect(&service, "alice");
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            service.register("alice", tx),
            Err(ServiceError::UsernameTaken)
        ));
    }

    #[test]
    fn test_join_reports_waiting_depth() {
        let (service, _summaries) = test_service(true);
        let (alice, mut alice_rx) = connect(&service, "alice");
        let (bob, mut bob_rx) = connect(&service, "bob");

        service.join_queue(alice, false).unwrap();
        let messages = drain(&mut alice_rx);
        assert!(matches!(
            messages[0],
            ServerMessage::QueueStatus {
                status: QueueState::Waiting,
                queue_size: Some(1),
                ..
            }
        ));

        service.join_queue(bob, false).unwrap();
        // Both waiting players see the new depth
        assert!(matches!(
            drain(&mut alice_rx)[0],
            ServerMessage::QueueStatus {
                queue_size: Some(2),
                ..
            }
        ));
        assert!(matches!(
            drain(&mut bob_rx)[0],
            ServerMessage::QueueStatus {
                queue_size: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn test_third_join_starts_game_and_broadcasts() {
        let (service, _summaries) = test_service(true);
        let (alice, mut alice_rx) = connect(&service, "alice");
        let (bob, _bob_rx) = connect(&service, "bob");
        let (carol, mut carol_rx) = connect(&service, "carol");

        service.join_queue(alice, false).unwrap();
        service.join_queue(bob, false).unwrap();
        drain(&mut alice_rx);
        service.join_queue(carol, false).unwrap();

        for rx in [&mut alice_rx, &mut carol_rx] {
            let messages = drain(rx);
            assert!(matches!(
                messages[0],
                ServerMessage::QueueStatus {
                    status: QueueState::Matched,
                    session_id: Some(_),
                    ..
                }
            ));
            let snapshot = last_snapshot(&messages).expect("initial snapshot");
            assert_eq!(snapshot.game_state, SessionPhase::InProgress);
            assert_eq!(snapshot.players.len(), 3);
            for player in &snapshot.players {
                assert_eq!(player.hand_size, 3);
            }
            // Hidden information: snapshots carry sizes, never hand contents
            assert!(snapshot.table_cards.len() == 4 || snapshot.table_cards.is_empty());
        }
    }

    #[test]
    fn test_move_without_session_is_an_error() {
        let (service, _summaries) = test_service(true);
        let (alice, _alice_rx) = connect(&service, "alice");
        assert!(matches!(
            service.play_move(&alice.username, 0, &[]),
            Err(ServiceError::NotInSession)
        ));
    }

    #[test]
    fn test_out_of_turn_move_rejected_and_state_untouched() {
        let (service, _summaries) = test_service(true);
        let (alice, _a) = connect(&service, "alice");
        let (bob, _b) = connect(&service, "bob");
        let (carol, _c) = connect(&service, "carol");
        for player in [alice, bob, carol] {
            service.join_queue(player, false).unwrap();
        }

        let session = service.registry.find_by_user("alice").unwrap();
        let (current_name, other_name) = {
            let guard = session.lock();
            let engine = guard.engine.as_ref().unwrap();
            let current = engine.current_player_index();
            (
                engine.players()[current].name().to_string(),
                engine.players()[(current + 1) % 3].name().to_string(),
            )
        };

        assert!(matches!(
            service.play_move(&other_name, 0, &[]),
            Err(ServiceError::NotYourTurn)
        ));
        // The rejected move changed nothing
        let guard = session.lock();
        let engine = guard.engine.as_ref().unwrap();
        assert_eq!(engine.players()[0].hand().len(), 3);
        drop(guard);

        // A duplicate retransmit after a successful move hits the same gate
        service.play_move(&current_name, 0, &[]).unwrap();
        assert!(matches!(
            service.play_move(&current_name, 0, &[]),
            Err(ServiceError::NotYourTurn)
        ));
    }

    #[test]
    fn test_bad_indices_rejected() {
        let (service, _summaries) = test_service(true);
        let (alice, _a) = connect(&service, "alice");
        let (bob, _b) = connect(&service, "bob");
        let (carol, _c) = connect(&service, "carol");
        for player in [alice, bob, carol] {
            service.join_queue(player, false).unwrap();
        }

        let session = service.registry.find_by_user("alice").unwrap();
        let current_name = {
            let guard = session.lock();
            let engine = guard.engine.as_ref().unwrap();
            engine.players()[engine.current_player_index()].name().to_string()
        };

        assert!(matches!(
            service.play_move(&current_name, 5, &[]),
            Err(ServiceError::HandIndexOutOfRange)
        ));
        assert!(matches!(
            service.play_move(&current_name, 0, &[99]),
            Err(ServiceError::TableIndexOutOfRange)
        ));
    }

    #[test]
    fn test_full_game_reaches_summary() {
        let (service, mut summaries) = test_service(true);
        let (alice, mut alice_rx) = connect(&service, "alice");
        let (bob, _b) = connect(&service, "bob");
        let (carol, _c) = connect(&service, "carol");
        for player in [alice, bob, carol] {
            service.join_queue(player, false).unwrap();
        }

        let session = service.registry.find_by_user("alice").unwrap();
        // Placements only: 36 moves spread over four rounds end the game
        for _ in 0..64 {
            if session.lock().phase == SessionPhase::Finished {
                break;
            }
            let current_name = {
                let guard = session.lock();
                let engine = guard.engine.as_ref().unwrap();
                engine.players()[engine.current_player_index()].name().to_string()
            };
            service.play_move(&current_name, 0, &[]).unwrap();
        }

        assert_eq!(session.lock().phase, SessionPhase::Finished);
        let summary = summaries.try_recv().expect("summary emitted");
        assert_eq!(summary.players.len(), 3);
        assert!(summary.winner.is_some());
        assert!(summary.players.iter().any(|(name, _)| Some(name) == summary.winner.as_ref()));

        let messages = drain(&mut alice_rx);
        let terminal = last_snapshot(&messages).expect("terminal snapshot");
        assert_eq!(terminal.game_state, SessionPhase::Finished);
        assert!(terminal.message.as_deref().unwrap().starts_with("Game Over!"));

        // Teardown cleared both registry maps
        assert_eq!(service.registry.session_count(), 0);
        assert_eq!(service.registry.player_count(), 0);
    }

    #[test]
    fn test_ack_start_waits_for_all_ready() {
        let (service, _summaries) = test_service(false);
        let (alice, mut alice_rx) = connect(&service, "alice");
        let (bob, _b) = connect(&service, "bob");
        let (carol, _c) = connect(&service, "carol");
        for player in [alice, bob, carol] {
            service.join_queue(player, false).unwrap();
        }

        let session = service.registry.find_by_user("alice").unwrap();
        assert_eq!(session.lock().phase, SessionPhase::Ready);
        let messages = drain(&mut alice_rx);
        assert_eq!(
            last_snapshot(&messages).unwrap().game_state,
            SessionPhase::Ready
        );

        service.ready("alice").unwrap();
        service.ready("bob").unwrap();
        assert_eq!(session.lock().phase, SessionPhase::Ready);
        service.ready("carol").unwrap();
        assert_eq!(session.lock().phase, SessionPhase::InProgress);
        assert_eq!(
            last_snapshot(&drain(&mut alice_rx)).unwrap().game_state,
            SessionPhase::InProgress
        );
    }

    #[test]
    fn test_disconnect_aborts_running_match() {
        let (service, mut summaries) = test_service(true);
        let (alice, _a) = connect(&service, "alice");
        let (bob, mut bob_rx) = connect(&service, "bob");
        let (carol, _c) = connect(&service, "carol");
        let alice_conn = alice.clone();
        for player in [alice, bob, carol] {
            service.join_queue(player, false).unwrap();
        }
        drain(&mut bob_rx);

        service.unregister(&alice_conn);

        let messages = drain(&mut bob_rx);
        let terminal = last_snapshot(&messages).expect("terminal snapshot");
        assert_eq!(terminal.game_state, SessionPhase::Finished);
        assert!(terminal.message.as_deref().unwrap().contains("alice disconnected"));

        let summary = summaries.try_recv().expect("summary emitted");
        assert!(summary.winner.is_none());
        assert_eq!(service.registry.session_count(), 0);
        assert_eq!(service.registry.player_count(), 0);

        // The username is free again
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(service.register("alice", tx).is_ok());
    }

    #[test]
    fn test_leave_queue_refreshes_depths() {
        let (service, _summaries) = test_service(true);
        let (alice, _a) = connect(&service, "alice");
        let (bob, mut bob_rx) = connect(&service, "bob");

        service.join_queue(alice, false).unwrap();
        service.join_queue(bob, false).unwrap();
        drain(&mut bob_rx);

        service.leave_queue("alice");
        assert!(matches!(
            drain(&mut bob_rx)[0],
            ServerMessage::QueueStatus {
                queue_size: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_concurrent_duplicate_moves_apply_once() {
        let (service, _summaries) = test_service(true);
        let (alice, _a) = connect(&service, "alice");
        let (bob, _b) = connect(&service, "bob");
        let (carol, _c) = connect(&service, "carol");
        for player in [alice, bob, carol] {
            service.join_queue(player, false).unwrap();
        }
        let service = Arc::new(service);

        let session = service.registry.find_by_user("alice").unwrap();
        let current_name = {
            let guard = session.lock();
            let engine = guard.engine.as_ref().unwrap();
            engine.players()[engine.current_player_index()].name().to_string()
        };

        // A retransmitted move races the original: the session lock serializes
        // them and the loser fails the turn gate
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                let name = current_name.clone();
                std::thread::spawn(move || service.play_move(&name, 0, &[]).is_ok())
            })
            .collect();
        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(applied, 1);

        let guard = session.lock();
        let engine = guard.engine.as_ref().unwrap();
        let played_index = engine.players().iter().position(|p| p.name() == current_name).unwrap();
        assert_eq!(engine.players()[played_index].hand().len(), 2);
    }

    #[test]
    fn test_join_while_in_session_rejected() {
        let (service, _summaries) = test_service(true);
        let (alice, _a) = connect(&service, "alice");
        let (bob, _b) = connect(&service, "bob");
        let (carol, _c) = connect(&service, "carol");
        let alice_again = alice.clone();
        for player in [alice, bob, carol] {
            service.join_queue(player, false).unwrap();
        }

        assert!(matches!(
            service.join_queue(alice_again, true),
            Err(ServiceError::Session(SessionError::AlreadyInSession))
        ));
    }
}
