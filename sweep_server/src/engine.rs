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

//! Capture rule engine: dealing, sum-15 captures, sweeps, scoring

use rand::{
    Rng, SeedableRng,
    rngs::StdRng,
    seq::{IndexedRandom, SliceRandom},
};
use sweep_common::{
    CAPTURE_SUM, Card, HAND_SIZE, NUM_PLAYERS, RANKS, Rank, SUITS, Suit, TABLE_DEAL,
};
use tracing::{debug, info, warn};

/// Ordered supply of the 40 cards; shrinks via draw, never refilled mid-match
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    fn new() -> Self {
        let mut cards = Vec::with_capacity(SUITS.len() * RANKS.len());
        for suit in SUITS {
            for rank in RANKS {
                cards.push(Card(suit, rank));
            }
        }
        Self { cards }
    }

    fn shuffle(&mut self, rng: &mut StdRng) {
        self.cards.shuffle(rng);
    }

    fn draw(&mut self) -> Option<Card> {
        if self.cards.is_empty() {
            warn!("attempted to draw from empty deck");
            return None;
        }
        Some(self.cards.remove(0))
    }

    /// Number of undrawn cards
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether every card has been drawn
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// One player's cards and sweep tally, owned by a [`CaptureEngine`]
pub struct PlayerState {
    name: String,
    hand: Vec<Card>,
    collected: Vec<Card>,
    sweeps: u32,
}

impl PlayerState {
    fn new(name: String) -> Self {
        Self {
            name,
            hand: Vec::new(),
            collected: Vec::new(),
            sweeps: 0,
        }
    }

    /// Player's username
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current hand, in deal order
    pub fn hand(&self) -> &[Card] {
        &self.hand
    }

    /// Number of captured cards
    pub fn collected_len(&self) -> usize {
        self.collected.len()
    }

    /// Sweep count
    pub fn sweeps(&self) -> u32 {
        self.sweeps
    }

    /// Points from captured cards: each diamond is worth 1 (the 7 of diamonds
    /// 2), and each non-diamond seven is worth 1
    pub fn points(&self) -> u32 {
        self.collected
            .iter()
            .map(|card| match *card {
                Card(Suit::Diamonds, Rank::Seven) => 2,
                Card(Suit::Diamonds, _) => 1,
                Card(_, Rank::Seven) => 1,
                _ => 0,
            })
            .sum()
    }
}

/// Deterministic rule engine for one three-player match
///
/// All randomness (shuffle, assist search, tie break) flows through one
/// seedable generator.
pub struct CaptureEngine {
    deck: Deck,
    players: Vec<PlayerState>,
    table_cards: Vec<Card>,
    current_player_index: usize,
    last_collected: Vec<Card>,
    first_round: bool,
    rng: StdRng,
}

impl CaptureEngine {
    /// Create an engine for the given players, seeded from the OS
    pub fn new(player_names: [String; NUM_PLAYERS]) -> Self {
        Self::with_rng(player_names, StdRng::from_os_rng())
    }

    /// Create an engine with an explicit random source
    pub fn with_rng(player_names: [String; NUM_PLAYERS], rng: StdRng) -> Self {
        Self {
            deck: Deck::new(),
            players: player_names.into_iter().map(PlayerState::new).collect(),
            table_cards: Vec::new(),
            current_player_index: 0,
            last_collected: Vec::new(),
            first_round: true,
            rng,
        }
    }

    /// Reset all state, shuffle, and deal the opening hands and table
    ///
    /// If the four initial table cards sum to 15, the starting player captures
    /// them immediately and earns a sweep before any turn is taken.
    pub fn start_game(&mut self, starting_index: usize) {
        info!(starting_index, "starting game");
        self.reset(starting_index);
        self.deck.shuffle(&mut self.rng);
        self.deal_initial();
        self.check_initial_sweep();
        info!("game started");
    }

    fn reset(&mut self, starting_index: usize) {
        for player in &mut self.players {
            player.hand.clear();
            player.collected.clear();
            player.sweeps = 0;
        }
        self.deck = Deck::new();
        self.table_cards.clear();
        self.current_player_index = starting_index % self.players.len();
        self.last_collected.clear();
        self.first_round = true;
    }

    fn deal_initial(&mut self) {
        for player in &mut self.players {
            for _ in 0..HAND_SIZE {
                if let Some(card) = self.deck.draw() {
                    player.hand.push(card);
                }
            }
        }
        for _ in 0..TABLE_DEAL {
            if let Some(card) = self.deck.draw() {
                self.table_cards.push(card);
            }
        }
        debug!(remaining = self.deck.len(), "dealt opening hands and table");
    }

    fn check_initial_sweep(&mut self) {
        if !self.first_round {
            return;
        }
        let table_sum: u32 = self.table_cards.iter().map(Card::value).sum();
        if table_sum == CAPTURE_SUM {
            let starter = &mut self.players[self.current_player_index];
            info!(player = %starter.name, "initial table sums to 15, awarding sweep");
            starter.collected.append(&mut self.table_cards);
            starter.sweeps += 1;
            self.first_round = false;
        }
    }

    /// Play `card` from `player_index`'s hand, capturing `selection` if legal
    ///
    /// A capture happens iff the values sum to 15 and the selection is a
    /// duplicate-free subset of the table; a selection that clears the whole
    /// table is a sweep. Anything else (empty selection, wrong sum, cards not
    /// on the table) places the card on the table instead. An invalid
    /// selection is never an error. A card not in the player's hand is
    /// ignored outright.
    pub fn play_card_with_selection(&mut self, player_index: usize, card: Card, selection: &[Card]) {
        let player_name = self.players[player_index].name.clone();
        let Some(hand_pos) = self.players[player_index].hand.iter().position(|&c| c == card) else {
            warn!(player = %player_name, %card, "tried to play a card not in hand");
            return;
        };

        let sum: u32 = card.value() + selection.iter().map(Card::value).sum::<u32>();
        self.players[player_index].hand.remove(hand_pos);

        let distinct = selection
            .iter()
            .enumerate()
            .all(|(i, c)| !selection[..i].contains(c));
        let on_table = selection.iter().all(|c| self.table_cards.contains(c));

        if sum == CAPTURE_SUM && distinct && on_table && !selection.is_empty() {
            let is_sweep = selection.len() == self.table_cards.len();
            self.table_cards.retain(|c| !selection.contains(c));

            let player = &mut self.players[player_index];
            player.collected.extend_from_slice(selection);
            player.collected.push(card);
            if is_sweep {
                player.sweeps += 1;
                info!(player = %player_name, "SWEEP! table cleared");
            } else {
                debug!(
                    player = %player_name,
                    captured = selection.len() + 1,
                    "capture"
                );
            }

            self.last_collected = selection.to_vec();
            self.last_collected.push(card);
        } else {
            if sum != CAPTURE_SUM {
                debug!(player = %player_name, %card, sum, "played to table, no capture");
            } else {
                warn!(player = %player_name, "invalid selection, played to table");
            }
            self.table_cards.push(card);
            self.last_collected.clear();
        }

        self.advance_turn();
    }

    // Turns rotate in the decreasing-index direction.
    fn advance_turn(&mut self) {
        self.current_player_index =
            (self.current_player_index + self.players.len() - 1) % self.players.len();
    }

    /// Find every table subset that sums with `card` to 15 and pick one
    /// uniformly at random; empty if no capture exists
    pub fn find_random_valid_sum15(&mut self, card: Card) -> Vec<Card> {
        let n = self.table_cards.len();
        let mut combinations = Vec::new();
        for mask in 1usize..(1 << n) {
            let subset: Vec<Card> = (0..n)
                .filter(|i| mask & (1 << i) != 0)
                .map(|i| self.table_cards[i])
                .collect();
            let sum: u32 = card.value() + subset.iter().map(Card::value).sum::<u32>();
            if sum == CAPTURE_SUM {
                combinations.push(subset);
            }
        }
        combinations.choose(&mut self.rng).cloned().unwrap_or_default()
    }

    /// Deal up to 3 fresh cards to each player, stopping as the deck runs dry
    pub fn deal_new_round(&mut self) {
        debug!(remaining = self.deck.len(), "dealing new round");
        for player in &mut self.players {
            for _ in 0..HAND_SIZE {
                if let Some(card) = self.deck.draw() {
                    player.hand.push(card);
                }
            }
        }
    }

    /// Whether every player's hand is empty
    pub fn all_hands_empty(&self) -> bool {
        self.players.iter().all(|p| p.hand.is_empty())
    }

    /// Whether the match is over: all hands and the deck empty
    pub fn is_game_over(&self) -> bool {
        self.all_hands_empty() && self.deck.is_empty()
    }

    /// Award any cards left on the table to the player one turn-advance step
    /// past the current index
    pub fn finish_game(&mut self) {
        if !self.table_cards.is_empty() {
            let last_index =
                (self.current_player_index + self.players.len() - 1) % self.players.len();
            debug!(
                player = %self.players[last_index].name,
                count = self.table_cards.len(),
                "awarding remaining table cards"
            );
            let remaining = std::mem::take(&mut self.table_cards);
            self.players[last_index].collected.extend(remaining);
        }
        info!("game finished");
    }

    /// Index of the winner: highest points + sweeps, ties broken by collected
    /// count then a coin flip; `None` while the game is still running
    pub fn winner(&mut self) -> Option<usize> {
        if !self.is_game_over() {
            return None;
        }

        let mut winner = 0;
        let mut best_score = 0;
        for i in 0..self.players.len() {
            let score = self.players[i].points() + self.players[i].sweeps();
            debug!(
                player = %self.players[i].name,
                points = self.players[i].points(),
                sweeps = self.players[i].sweeps(),
                "final score"
            );
            if i == 0 || score > best_score {
                best_score = score;
                winner = i;
            } else if score == best_score {
                winner = self.tiebreak(winner, i);
            }
        }
        info!(
            player = %self.players[winner].name,
            score = best_score,
            "winner decided"
        );
        Some(winner)
    }

    fn tiebreak(&mut self, a: usize, b: usize) -> usize {
        let a_cards = self.players[a].collected_len();
        let b_cards = self.players[b].collected_len();
        if a_cards > b_cards {
            return a;
        }
        if b_cards > a_cards {
            return b;
        }
        if self.rng.random_bool(0.5) { a } else { b }
    }

    /// Index of the player whose turn it is
    pub fn current_player_index(&self) -> usize {
        self.current_player_index
    }

    /// All players, in seat order
    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    /// The face-up table cards, in order
    pub fn table_cards(&self) -> &[Card] {
        &self.table_cards
    }

    /// Number of undrawn cards in the deck
    pub fn deck_len(&self) -> usize {
        self.deck.len()
    }

    /// Cards collected by the most recent move; empty after a placement
    pub fn last_collected(&self) -> &[Card] {
        &self.last_collected
    }
}
