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

//! Common structure definitions for Sweep Online

#![warn(missing_docs)]

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Number of cards in the deck (4 suits, 10 ranks, no 8/9/10 pip cards)
pub const DECK_SIZE: usize = 40;
/// Cards dealt to each player's hand per round
pub const HAND_SIZE: usize = 3;
/// Cards dealt face up to the table when a game starts
pub const TABLE_DEAL: usize = 4;
/// Target sum for a capture: played card plus selected table cards
pub const CAPTURE_SUM: u32 = 15;
/// Players per match
pub const NUM_PLAYERS: usize = 3;

/// A card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card(pub Suit, pub Rank);
impl Card {
    /// Capture value of this card
    pub fn value(&self) -> u32 {
        self.1.value()
    }
}
impl Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut character = match self.0 {
            Suit::Clubs => 0x1f0a0,
            Suit::Diamonds => 0x1f0b0,
            Suit::Hearts => 0x1f0c0,
            Suit::Spades => 0x1f0d0,
        };
        character |= match self.1 {
            Rank::Ace => 0x1,
            Rank::Two => 0x2,
            Rank::Three => 0x3,
            Rank::Four => 0x4,
            Rank::Five => 0x5,
            Rank::Six => 0x6,
            Rank::Seven => 0x7,
            Rank::Jack => 0xb,
            Rank::Queen => 0xd,
            Rank::King => 0xe,
        };
        write!(
            f,
            "{}",
            char::from_u32(character).expect("constructed from constants")
        )
    }
}

/// The suit of a card
#[expect(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Suit {
    #[serde(rename = "C")]
    Clubs,
    #[serde(rename = "D")]
    Diamonds,
    #[serde(rename = "H")]
    Hearts,
    #[serde(rename = "S")]
    Spades,
}

/// The rank of a card
///
/// Eights, nines, and tens do not exist in this deck; the face cards fill the
/// 8–10 value slots instead (queen = 8, jack = 9, king = 10).
#[expect(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rank {
    #[serde(rename = "A")]
    Ace,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
}
impl Rank {
    /// Capture value of this rank
    pub fn value(&self) -> u32 {
        match *self {
            Rank::Ace => 1,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Queen => 8,
            Rank::Jack => 9,
            Rank::King => 10,
        }
    }
}

/// Every suit, in a fixed order
pub const SUITS: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];
/// Every rank, in a fixed order
pub const RANKS: [Rank; 10] = [
    Rank::Ace,
    Rank::Two,
    Rank::Three,
    Rank::Four,
    Rank::Five,
    Rank::Six,
    Rank::Seven,
    Rank::Jack,
    Rank::Queen,
    Rank::King,
];

/// Lifecycle phase of a match session
#[expect(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Waiting,
    Ready,
    InProgress,
    Finished,
}

/// A message from a client to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the matchmaking queue for the given mode
    #[serde(rename_all = "camelCase")]
    JoinQueue {
        /// Ranked or casual queue
        ranked: bool,
    },
    /// Leave any matchmaking queue
    LeaveQueue,
    /// Play a card, optionally capturing selected table cards
    #[serde(rename_all = "camelCase")]
    PlayMove {
        /// Index into the sender's hand as last broadcast
        hand_card_index: usize,
        /// Indices into the table cards as last broadcast
        table_card_indices: Vec<usize>,
    },
    /// Acknowledge readiness to start a formed match
    Ready,
}

/// A message from the server to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Matchmaking progress for a queued player
    #[serde(rename_all = "camelCase")]
    QueueStatus {
        /// Waiting or matched
        status: QueueState,
        /// Current queue depth, while waiting
        #[serde(skip_serializing_if = "Option::is_none")]
        queue_size: Option<usize>,
        /// Session id, once matched
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Full session snapshot, broadcast after every state change
    GameState(GameSnapshot),
    /// A targeted error reply
    Error {
        /// Human-readable description
        error: String,
    },
}

/// Matchmaking status carried by [`ServerMessage::QueueStatus`]
#[expect(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Waiting,
    Matched,
}

/// Session state visible to every bound player
///
/// Identical for all three recipients: table cards are public, opponents'
/// hands appear as sizes only. A player's own hand contents are tracked by
/// their client, not re-sent here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Session this snapshot describes
    pub session_id: String,
    /// Lifecycle phase
    pub game_state: SessionPhase,
    /// Index of the player whose turn it is
    pub current_player_index: usize,
    /// Face-up table cards, in order
    pub table_cards: Vec<Card>,
    /// Per-player public state, in seat order
    pub players: Vec<PlayerSnapshot>,
    /// Human-readable note (game over, disconnect, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Public view of one player inside a [`GameSnapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    /// Player's username
    pub username: String,
    /// Number of cards in hand
    pub hand_size: usize,
    /// Number of captured cards
    pub collected_size: usize,
    /// Points from captured cards
    pub points: u32,
    /// Sweep count
    pub sweeps: u32,
    /// Whether it is this player's turn
    pub is_current_player: bool,
}
