// src/engine.rs
// The draw engine: per-ticket marking state, prize scoring with turn-taking,
// the legacy whole-card board and undo by full replay.
//
// Everything here is synchronous and in-memory. Callers serialize access per
// session; the engine never logs, blocks or touches the filesystem.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::defs::{BaseId, Number, PrizeId, TicketId, FIRSTNUMBER, NEAR_WIN_DEPTH, REEVALUATE};
use crate::pattern::{evaluate, UsedPatterns};
use crate::prize::{is_eligible, sequential_turn_id, Prize, PrizeDefinition, PrizeKind};
use crate::ticket::TicketCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketKey {
    pub base_id: BaseId,
    pub ticket_id: TicketId,
}

impl TicketKey {
    pub fn new(base_id: BaseId, ticket_id: TicketId) -> Self {
        Self { base_id, ticket_id }
    }
}

/// Marking state of one ticket in one base for the current game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketState {
    pub key: TicketKey,
    /// Grid this state marks (the grid of the first prize bound to the base)
    pub grid_index: usize,
    pub total_numbers: usize,
    pub missing_numbers: BTreeSet<Number>,
    pub matches: usize,
    pub used_patterns: UsedPatterns,
}

impl TicketState {
    /// Numbers already drawn are marked immediately, so late registration
    /// lands in the same state as registration before the first ball.
    fn new(key: TicketKey, grid_index: usize, catalog: &TicketCatalog, drawn: &HashSet<Number>) -> Option<Self> {
        let grid = catalog.grid(key.ticket_id, grid_index)?;
        let numbers: BTreeSet<Number> = grid.iter().copied().collect();
        let missing_numbers: BTreeSet<Number> = numbers.iter().copied().filter(|n| !drawn.contains(n)).collect();
        Some(Self {
            key,
            grid_index,
            total_numbers: numbers.len(),
            matches: numbers.len() - missing_numbers.len(),
            missing_numbers,
            used_patterns: UsedPatterns::new(),
        })
    }

    fn mark(&mut self, number: Number) {
        if self.missing_numbers.remove(&number) {
            self.matches += 1;
        }
    }

    pub fn missing_count(&self) -> usize {
        self.missing_numbers.len()
    }

    pub fn has_won_cheia(&self) -> bool {
        self.used_patterns.get(&PrizeKind::Cheia).is_some_and(|sets| !sets.is_empty())
    }
}

/// Whole-card winners and tickets missing 1..=NEAR_WIN_DEPTH numbers,
/// kept independently of the prize registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyBoard {
    pub winners: Vec<TicketKey>,
    pub near_wins: BTreeMap<usize, Vec<TicketKey>>,
}

impl Default for LegacyBoard {
    fn default() -> Self {
        Self {
            winners: Vec::new(),
            near_wins: (1..=NEAR_WIN_DEPTH).map(|missing| (missing, Vec::new())).collect(),
        }
    }
}

impl LegacyBoard {
    fn remove_from_buckets(&mut self, key: TicketKey, keep: Option<usize>) -> bool {
        let mut removed = false;
        for (missing, bucket) in self.near_wins.iter_mut() {
            if Some(*missing) == keep {
                continue;
            }
            let before = bucket.len();
            bucket.retain(|k| *k != key);
            removed |= before != bucket.len();
        }
        removed
    }

    /// Place a ticket according to how many numbers it still misses.
    fn update(&mut self, key: TicketKey, missing: usize) -> bool {
        if missing == 0 {
            if self.winners.contains(&key) {
                return false;
            }
            self.winners.push(key);
            self.remove_from_buckets(key, None);
            return true;
        }
        if missing > NEAR_WIN_DEPTH {
            return self.remove_from_buckets(key, None);
        }
        let mut changed = self.remove_from_buckets(key, Some(missing));
        let bucket = self.near_wins.entry(missing).or_default();
        if !bucket.contains(&key) {
            bucket.push(key);
            changed = true;
        }
        changed
    }

    pub fn bucket(&self, missing: usize) -> &[TicketKey] {
        self.near_wins.get(&missing).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Engine state for one session.
#[derive(Debug, Clone)]
pub struct DrawEngine {
    max_balls: Number,
    /// Every catalog ticket plays, without sales gating
    open_play: bool,
    bases: BTreeMap<BaseId, Arc<TicketCatalog>>,
    prizes: Vec<Prize>,
    registered: BTreeSet<TicketId>,
    drawn_numbers: Vec<Number>,
    drawn_set: HashSet<Number>,
    states: BTreeMap<TicketKey, TicketState>,
    legacy: LegacyBoard,
}

impl DrawEngine {
    pub fn new(max_balls: Number, open_play: bool) -> Self {
        Self {
            max_balls,
            open_play,
            bases: BTreeMap::new(),
            prizes: Vec::new(),
            registered: BTreeSet::new(),
            drawn_numbers: Vec::new(),
            drawn_set: HashSet::new(),
            states: BTreeMap::new(),
            legacy: LegacyBoard::default(),
        }
    }

    // ---------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------

    /// Attach a ticket base. Replacing a base rebuilds the ticket states.
    pub fn add_base(&mut self, base_id: BaseId, catalog: Arc<TicketCatalog>) {
        if self.bases.insert(base_id, catalog).is_some() {
            self.rebuild_states();
        } else {
            self.ensure_states();
        }
    }

    /// Append a prize to the registry. A duplicate id is ignored.
    /// The new prize is scored right away against the balls already drawn.
    pub fn add_prize(&mut self, def: PrizeDefinition) -> bool {
        if self.prize(def.id).is_some() {
            return false;
        }
        self.prizes.push(Prize::from_definition(def));
        self.ensure_states();
        self.process_number(REEVALUATE);
        true
    }

    /// Make a ticket eligible to play. Idempotent; returns true when newly registered.
    pub fn register_ticket(&mut self, ticket_id: TicketId) -> bool {
        if !self.registered.insert(ticket_id) {
            return false;
        }
        for (base_id, grid_index) in self.state_grids() {
            let key = TicketKey::new(base_id, ticket_id);
            if self.states.contains_key(&key) {
                continue;
            }
            let Some(catalog) = self.bases.get(&base_id) else {
                continue;
            };
            if let Some(state) = TicketState::new(key, grid_index, catalog, &self.drawn_set) {
                self.states.insert(key, state);
            }
        }
        true
    }

    /// Ticket state is kept so a later re-registration picks up where it was.
    pub fn unregister_ticket(&mut self, ticket_id: TicketId) -> bool {
        self.registered.remove(&ticket_id)
    }

    pub fn clear_registered(&mut self) {
        self.registered.clear();
    }

    /// Finalize or reopen a prize, then re-evaluate without drawing: closing
    /// a sequential prize can hand the turn to one that is already satisfied.
    /// Returns None for an unknown prize, otherwise whether any result changed.
    pub fn set_prize_status(&mut self, prize_id: PrizeId, realized: bool) -> Option<bool> {
        let prize = self.prizes.iter_mut().find(|p| p.id == prize_id)?;
        prize.realized = realized;
        Some(self.process_number(REEVALUATE))
    }

    // ---------------------------------------------------------------
    // Game flow
    // ---------------------------------------------------------------

    /// Clear balls and results; registrations, prizes and catalogs stay.
    pub fn start_new_game(&mut self) {
        self.drawn_numbers.clear();
        self.drawn_set.clear();
        self.legacy = LegacyBoard::default();
        for prize in &mut self.prizes {
            prize.reset_results();
        }
        self.rebuild_states();
    }

    /// Draw a ball, or re-evaluate with `REEVALUATE`. Out-of-range and
    /// repeated balls are ignored. Returns true if any winner or near-winner
    /// list changed.
    pub fn process_number(&mut self, number: Number) -> bool {
        if number != REEVALUATE {
            if !self.accepts(number) {
                return false;
            }
            self.drawn_numbers.push(number);
            self.drawn_set.insert(number);
            for state in self.states.values_mut() {
                state.mark(number);
            }
        }

        let prizes_changed = self.score_prizes();
        let legacy_changed = self.update_legacy();
        prizes_changed || legacy_changed
    }

    /// Remove the last ball and rebuild everything by replaying the rest.
    /// Prizes listed in `preserved_realized` are closed again as soon as the
    /// replay gives them winners. Returns the removed ball.
    pub fn undo_last_number(&mut self, preserved_realized: &BTreeSet<PrizeId>) -> Option<Number> {
        let (&last, remaining) = self.drawn_numbers.split_last()?;
        let remaining = remaining.to_vec();
        self.replay(&remaining, preserved_realized);
        Some(last)
    }

    /// Reset the game and feed `draws` through `process_number` in order.
    pub fn replay(&mut self, draws: &[Number], preserved_realized: &BTreeSet<PrizeId>) {
        self.start_new_game();
        self.restore_realized(preserved_realized);
        for &number in draws {
            self.process_number(number);
            self.restore_realized(preserved_realized);
        }
    }

    fn restore_realized(&mut self, preserved: &BTreeSet<PrizeId>) {
        if preserved.is_empty() {
            return;
        }
        loop {
            let mut restored = false;
            for prize in &mut self.prizes {
                if preserved.contains(&prize.id) && !prize.realized && !prize.winners.is_empty() {
                    prize.realized = true;
                    restored = true;
                }
            }
            if !restored {
                break;
            }
            self.process_number(REEVALUATE);
        }
    }

    fn accepts(&self, number: Number) -> bool {
        (FIRSTNUMBER..=self.max_balls).contains(&number) && !self.drawn_set.contains(&number)
    }

    fn score_prizes(&mut self) -> bool {
        let turn = sequential_turn_id(&self.prizes);
        let mut changed = false;

        for (key, state) in self.states.iter_mut() {
            if !(self.open_play || self.registered.contains(&key.ticket_id)) {
                continue;
            }
            let Some(catalog) = self.bases.get(&key.base_id) else {
                continue;
            };

            for prize in self.prizes.iter_mut() {
                if state.has_won_cheia() {
                    break;
                }
                if prize.base_id != key.base_id || !is_eligible(prize, turn) || prize.is_winner(key.ticket_id) {
                    continue;
                }
                let Some(grid) = catalog.grid(key.ticket_id, prize.grid_index) else {
                    continue;
                };

                let result = evaluate(prize.kind, grid, &self.drawn_set, &prize.pattern_indices, &state.used_patterns);
                if result.satisfied {
                    if let Some(indices) = &result.indices {
                        state.used_patterns.entry(prize.kind).or_default().push(indices.clone());
                    }
                    changed |= prize.add_winner(key.ticket_id, result.indices);
                } else if result.near {
                    changed |= prize.add_near_winner(key.ticket_id);
                } else {
                    changed |= prize.remove_near_winner(key.ticket_id);
                }
            }
        }
        changed
    }

    fn update_legacy(&mut self) -> bool {
        let mut changed = false;
        for (key, state) in &self.states {
            if !(self.open_play || self.registered.contains(&key.ticket_id)) {
                continue;
            }
            changed |= self.legacy.update(*key, state.missing_count());
        }
        changed
    }

    /// Bases that get ticket states, each with the grid of its first prize.
    fn state_grids(&self) -> Vec<(BaseId, usize)> {
        let mut grids: Vec<(BaseId, usize)> = Vec::new();
        for prize in &self.prizes {
            if !grids.iter().any(|(base, _)| *base == prize.base_id) {
                grids.push((prize.base_id, prize.grid_index));
            }
        }
        grids
    }

    fn ensure_states(&mut self) {
        for (base_id, grid_index) in self.state_grids() {
            let Some(catalog) = self.bases.get(&base_id).cloned() else {
                continue;
            };
            let ticket_ids: Vec<TicketId> = if self.open_play {
                catalog.tickets().iter().map(|t| t.id).collect()
            } else {
                self.registered.iter().copied().collect()
            };
            for ticket_id in ticket_ids {
                let key = TicketKey::new(base_id, ticket_id);
                if self.states.contains_key(&key) {
                    continue;
                }
                if let Some(state) = TicketState::new(key, grid_index, &catalog, &self.drawn_set) {
                    self.states.insert(key, state);
                }
            }
        }
    }

    fn rebuild_states(&mut self) {
        self.states.clear();
        self.ensure_states();
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn max_balls(&self) -> Number {
        self.max_balls
    }

    pub fn is_open_play(&self) -> bool {
        self.open_play
    }

    pub fn drawn_numbers(&self) -> &[Number] {
        &self.drawn_numbers
    }

    pub fn last_number(&self) -> Option<Number> {
        self.drawn_numbers.last().copied()
    }

    pub fn is_drawn(&self, number: Number) -> bool {
        self.drawn_set.contains(&number)
    }

    /// Whether `process_number(number)` would add a ball.
    pub fn would_accept(&self, number: Number) -> bool {
        self.accepts(number)
    }

    pub fn prizes(&self) -> &[Prize] {
        &self.prizes
    }

    pub fn prize(&self, prize_id: PrizeId) -> Option<&Prize> {
        self.prizes.iter().find(|p| p.id == prize_id)
    }

    pub fn sequential_turn(&self) -> Option<PrizeId> {
        sequential_turn_id(&self.prizes)
    }

    pub fn realized_prize_ids(&self) -> BTreeSet<PrizeId> {
        self.prizes.iter().filter(|p| p.realized).map(|p| p.id).collect()
    }

    pub fn registered(&self) -> &BTreeSet<TicketId> {
        &self.registered
    }

    pub fn is_registered(&self, ticket_id: TicketId) -> bool {
        self.registered.contains(&ticket_id)
    }

    /// Registered, or any ticket at all in open play.
    pub fn is_playing(&self, ticket_id: TicketId) -> bool {
        self.open_play || self.registered.contains(&ticket_id)
    }

    pub fn catalog(&self, base_id: BaseId) -> Option<&Arc<TicketCatalog>> {
        self.bases.get(&base_id)
    }

    pub fn bases(&self) -> impl Iterator<Item = (BaseId, &Arc<TicketCatalog>)> {
        self.bases.iter().map(|(id, catalog)| (*id, catalog))
    }

    /// Base whose catalog holds the ticket, first by base id.
    pub fn base_of_ticket(&self, ticket_id: TicketId) -> Option<BaseId> {
        self.bases.iter().find(|(_, c)| c.contains(ticket_id)).map(|(id, _)| *id)
    }

    pub fn ticket_state(&self, base_id: BaseId, ticket_id: TicketId) -> Option<&TicketState> {
        self.states.get(&TicketKey::new(base_id, ticket_id))
    }

    pub fn ticket_states(&self) -> impl Iterator<Item = &TicketState> {
        self.states.values()
    }

    pub fn legacy(&self) -> &LegacyBoard {
        &self.legacy
    }
}
