// src/prize.rs
// Prize rules, their winner bookkeeping and the sequential turn controller.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::defs::{BaseId, PrizeId, TicketId};
use crate::error::BingoError;
use crate::pattern::IndexSet;

/// The closed set of scoring patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PrizeKind {
    /// Any row, or on a 5x5 grid any column or main diagonal
    Quina,
    /// Custom set of grid positions
    Forma,
    /// Whole card
    Cheia,
}

impl PrizeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrizeKind::Quina => "quina",
            PrizeKind::Forma => "forma",
            PrizeKind::Cheia => "cheia",
        }
    }

    /// Forma prizes run in parallel; everything else waits for its turn.
    pub fn is_sequential(&self) -> bool {
        !matches!(self, PrizeKind::Forma)
    }
}

impl fmt::Display for PrizeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrizeKind {
    type Err = BingoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quina" => Ok(PrizeKind::Quina),
            "forma" => Ok(PrizeKind::Forma),
            "cheia" => Ok(PrizeKind::Cheia),
            other => Err(BingoError::UnknownPrizeKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for PrizeKind {
    type Error = BingoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PrizeKind> for String {
    fn from(kind: PrizeKind) -> Self {
        kind.as_str().to_string()
    }
}

fn default_true() -> bool {
    true
}

/// Persisted shape of a prize, without any per-game results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeDefinition {
    pub id: PrizeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PrizeKind,
    pub base_id: BaseId,
    #[serde(default)]
    pub grid_index: usize,
    #[serde(default)]
    pub pattern_indices: Vec<usize>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub realized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prize {
    pub id: PrizeId,
    pub name: String,
    pub kind: PrizeKind,
    pub base_id: BaseId,
    pub grid_index: usize,
    pub pattern_indices: Vec<usize>,
    pub active: bool,
    pub realized: bool,
    pub winners: Vec<TicketId>,
    pub near_winners: Vec<TicketId>,
    /// Which positions earned each winner the prize
    pub winner_patterns: BTreeMap<TicketId, IndexSet>,
}

impl Prize {
    pub fn from_definition(def: PrizeDefinition) -> Self {
        Self {
            id: def.id,
            name: def.name,
            kind: def.kind,
            base_id: def.base_id,
            grid_index: def.grid_index,
            pattern_indices: def.pattern_indices,
            active: def.active,
            realized: def.realized,
            winners: Vec::new(),
            near_winners: Vec::new(),
            winner_patterns: BTreeMap::new(),
        }
    }

    pub fn definition(&self) -> PrizeDefinition {
        PrizeDefinition {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            base_id: self.base_id,
            grid_index: self.grid_index,
            pattern_indices: self.pattern_indices.clone(),
            active: self.active,
            realized: self.realized,
        }
    }

    pub fn is_winner(&self, ticket: TicketId) -> bool {
        self.winners.contains(&ticket)
    }

    pub fn is_near_winner(&self, ticket: TicketId) -> bool {
        self.near_winners.contains(&ticket)
    }

    /// Move a ticket into winners. Returns false if it already was one.
    pub fn add_winner(&mut self, ticket: TicketId, indices: Option<IndexSet>) -> bool {
        if self.is_winner(ticket) {
            return false;
        }
        self.near_winners.retain(|&t| t != ticket);
        self.winners.push(ticket);
        if let Some(indices) = indices {
            self.winner_patterns.insert(ticket, indices);
        }
        true
    }

    /// Winners are never demoted to near-winners.
    pub fn add_near_winner(&mut self, ticket: TicketId) -> bool {
        if self.is_winner(ticket) || self.is_near_winner(ticket) {
            return false;
        }
        self.near_winners.push(ticket);
        true
    }

    pub fn remove_near_winner(&mut self, ticket: TicketId) -> bool {
        let before = self.near_winners.len();
        self.near_winners.retain(|&t| t != ticket);
        before != self.near_winners.len()
    }

    /// Clear per-game results and the realized flag, keeping the definition.
    pub fn reset_results(&mut self) {
        self.realized = false;
        self.winners.clear();
        self.near_winners.clear();
        self.winner_patterns.clear();
    }
}

/// Id of the one sequential prize currently in play: the first active,
/// unrealized, non-forma prize in registry order.
pub fn sequential_turn_id(prizes: &[Prize]) -> Option<PrizeId> {
    prizes
        .iter()
        .find(|p| p.active && !p.realized && p.kind.is_sequential())
        .map(|p| p.id)
}

/// Whether a prize is scored this round.
pub fn is_eligible(prize: &Prize, turn: Option<PrizeId>) -> bool {
    prize.active && !prize.realized && (!prize.kind.is_sequential() || turn == Some(prize.id))
}
