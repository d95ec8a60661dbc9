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

//! Matchmaking queues: accrete waiting players, form sessions of three

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use sweep_common::NUM_PLAYERS;
use tracing::{debug, info};

use crate::session::{GameSession, PlayerConnection, SessionError, SessionRegistry};

/// Result of joining a queue
pub enum MatchOutcome {
    /// Not enough players yet
    Waiting {
        /// Depth of the queue after joining
        queue_size: usize,
    },
    /// A match formed; the session has all three players bound
    Matched {
        /// The freshly created session
        session: Arc<GameSession>,
    },
}

#[derive(Default)]
struct ModeQueues {
    casual: VecDeque<PlayerConnection>,
    ranked: VecDeque<PlayerConnection>,
}

impl ModeQueues {
    fn queue(&mut self, ranked: bool) -> &mut VecDeque<PlayerConnection> {
        if ranked { &mut self.ranked } else { &mut self.casual }
    }
}

/// Two independent FIFO queues, one per mode
///
/// "Ranked" is a label: formation is arrival-order FIFO in both modes. The
/// queue lock is held across the whole dequeue-and-bind step, so concurrent
/// joins can never form overlapping groups or split an entry.
pub struct MatchmakingQueue {
    registry: Arc<SessionRegistry>,
    queues: Mutex<ModeQueues>,
}

impl MatchmakingQueue {
    /// A queue pair forming sessions through `registry`
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            queues: Mutex::new(ModeQueues::default()),
        }
    }

    /// Append a player and try to form a match from the head of the queue
    pub fn join(&self, player: PlayerConnection, ranked: bool) -> Result<MatchOutcome, SessionError> {
        let mut queues = self.queues.lock();
        if queues.casual.iter().chain(queues.ranked.iter()).any(|p| p.username == player.username)
        {
            // Re-joining without leaving first would let one user occupy two
            // seats of the same match
            return Err(SessionError::AlreadyInSession);
        }

        info!(
            player = %player.username,
            mode = if ranked { "ranked" } else { "casual" },
            "joining queue"
        );
        let queue = queues.queue(ranked);
        queue.push_back(player);

        if queue.len() < NUM_PLAYERS {
            debug!(have = queue.len(), need = NUM_PLAYERS, "not enough players yet");
            return Ok(MatchOutcome::Waiting {
                queue_size: queue.len(),
            });
        }

        let session = self.registry.create(ranked);
        for _ in 0..NUM_PLAYERS {
            let head = queue.pop_front().expect("length checked above");
            self.registry.bind(&session, head)?;
        }
        info!(session = session.id(), ranked, "match formed");
        Ok(MatchOutcome::Matched { session })
    }

    /// Remove a username from both queues; no-op if it is in neither
    pub fn leave(&self, username: &str) {
        let mut queues = self.queues.lock();
        queues.casual.retain(|p| p.username != username);
        queues.ranked.retain(|p| p.username != username);
        info!(player = %username, "left matchmaking queue");
    }

    /// Depth of one mode's queue
    pub fn depth(&self, ranked: bool) -> usize {
        let mut queues = self.queues.lock();
        queues.queue(ranked).len()
    }

    /// Everyone still waiting in one mode's queue, in arrival order
    pub fn waiting_players(&self, ranked: bool) -> Vec<PlayerConnection> {
        let mut queues = self.queues.lock();
        queues.queue(ranked).iter().cloned().collect()
    }
}
