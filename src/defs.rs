// src/defs.rs
// Shared numeric types and game constants.

/// A ball value, also used for the numbers printed on a grid.
pub type Number = u8;
pub type TicketId = u32;
pub type BaseId = u32;
pub type PrizeId = u32;

pub const FIRSTNUMBER: Number = 1;
pub const DEFAULT_MAX_BALLS: Number = 75;

/// Quina assumes every grid is laid out in rows of this many cells.
pub const QUINA_COLUMNS: usize = 5;

/// Legacy whole-card board tracks tickets missing 1..=NEAR_WIN_DEPTH numbers.
pub const NEAR_WIN_DEPTH: usize = 3;

/// Zero-padded width of the ticket id inside a barcode (check digit follows).
pub const BARCODE_ID_WIDTH: usize = 6;

/// Ball value that asks the engine to re-evaluate without drawing.
pub const REEVALUATE: Number = 0;
