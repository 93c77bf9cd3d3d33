// src/ticket.rs
// Tickets (cards) and the immutable catalog of a ticket base, plus barcode helpers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::defs::{Number, TicketId, BARCODE_ID_WIDTH};
use crate::error::{BingoError, BingoResult};

/// A purchasable card: one id, one check digit and one grid per play mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub check_digit: u8,
    pub grids: Vec<Vec<Number>>,
}

impl Ticket {
    pub fn grid(&self, index: usize) -> Option<&[Number]> {
        self.grids.get(index).map(Vec::as_slice)
    }

    pub fn barcode(&self) -> String {
        format_barcode(self.id, self.check_digit)
    }
}

/// All tickets of one base, indexed by id. Never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct TicketCatalog {
    tickets: Vec<Ticket>,
    index: HashMap<TicketId, usize>,
}

impl TicketCatalog {
    /// Build a catalog; a repeated id keeps its first occurrence.
    pub fn new(tickets: Vec<Ticket>) -> Self {
        let mut index = HashMap::with_capacity(tickets.len());
        let mut kept = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            if index.contains_key(&ticket.id) {
                continue;
            }
            index.insert(ticket.id, kept.len());
            kept.push(ticket);
        }
        Self { tickets: kept, index }
    }

    pub fn get(&self, id: TicketId) -> Option<&Ticket> {
        self.index.get(&id).map(|&i| &self.tickets[i])
    }

    pub fn contains(&self, id: TicketId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn grid(&self, id: TicketId, grid_index: usize) -> Option<&[Number]> {
        self.get(id).and_then(|t| t.grid(grid_index))
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn check_digit(&self, id: TicketId) -> Option<u8> {
        self.get(id).map(|t| t.check_digit)
    }

    pub fn is_valid_check_digit(&self, id: TicketId, digit: u8) -> bool {
        self.check_digit(id) == Some(digit)
    }

    /// Barcode as printed on the card; unknown ids get check digit 0.
    pub fn formatted_barcode(&self, id: TicketId) -> String {
        format_barcode(id, self.check_digit(id).unwrap_or(0))
    }
}

pub fn format_barcode(id: TicketId, check_digit: u8) -> String {
    format!("{:0width$}{}", id, check_digit, width = BARCODE_ID_WIDTH)
}

/// Split a scanned barcode into (ticket id, check digit). The last digit is the check digit.
pub fn parse_barcode(code: &str) -> BingoResult<(TicketId, u8)> {
    let code = code.trim();
    if code.len() < 2 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BingoError::InvalidBarcode(code.to_string()));
    }
    let value: u64 = code
        .parse()
        .map_err(|_| BingoError::InvalidBarcode(code.to_string()))?;
    let id = TicketId::try_from(value / 10).map_err(|_| BingoError::InvalidBarcode(code.to_string()))?;
    if id == 0 {
        return Err(BingoError::InvalidBarcode(code.to_string()));
    }
    Ok((id, (value % 10) as u8))
}
