// src/pouch.rs
// Balls still in play for a session, with random extraction for operators
// that have no physical cage.

use crate::defs::{Number, FIRSTNUMBER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pouch {
    pub numbers: Vec<Number>,
}

impl Pouch {
    pub fn new(max_balls: Number) -> Self {
        Pouch {
            numbers: (FIRSTNUMBER..=max_balls).collect(),
        }
    }

    /// The balls of a game where `drawn` have already come out.
    pub fn remaining(max_balls: Number, drawn: &[Number]) -> Self {
        let mut pouch = Self::new(max_balls);
        pouch.numbers.retain(|n| !drawn.contains(n));
        pouch
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// Take a random ball out, or None once the pouch is empty.
    pub fn extract(&mut self) -> Option<Number> {
        if self.is_empty() {
            return None;
        }
        let random_index = rand::random_range(0..self.len());
        Some(self.numbers.remove(random_index))
    }
}
