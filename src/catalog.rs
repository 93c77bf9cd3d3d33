// src/catalog.rs
// Flat-file ticket base loader and the process-wide catalog cache.
//
// Line format: `<id><check digit>-<grid>-<grid>...` where each grid is a run of
// two-digit numbers, e.g. `0000019-011012151922` is ticket 1, check digit 9,
// one grid [1, 10, 12, 15, 19, 22].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::defs::{Number, TicketId};
use crate::error::{BingoError, BingoResult};
use crate::logging::{log_info, log_warning};
use crate::ticket::{Ticket, TicketCatalog};

/// Result of parsing a whole ticket source.
#[derive(Debug, Default)]
pub struct ParsedBase {
    pub tickets: Vec<Ticket>,
    /// Non-blank lines that could not be parsed
    pub skipped: usize,
}

pub fn parse_line(line: &str) -> Option<Ticket> {
    let mut parts = line.trim().split('-');
    let id_part = parts.next()?;
    if id_part.len() < 2 || !id_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (id_str, digit_str) = id_part.split_at(id_part.len() - 1);
    let id: TicketId = id_str.parse().ok()?;
    let check_digit: u8 = digit_str.parse().ok()?;

    let mut grids = Vec::new();
    for field in parts {
        if field.is_empty() {
            continue;
        }
        grids.push(parse_grid(field)?);
    }

    Some(Ticket { id, check_digit, grids })
}

/// Split a run of two-digit numbers. An odd trailing digit is ignored.
fn parse_grid(field: &str) -> Option<Vec<Number>> {
    field
        .as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            text.parse::<Number>().ok()
        })
        .collect()
}

pub fn parse_base(content: &str) -> ParsedBase {
    let mut parsed = ParsedBase::default();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(ticket) => parsed.tickets.push(ticket),
            None => parsed.skipped += 1,
        }
    }
    parsed
}

pub fn load_catalog<P: AsRef<Path>>(path: P) -> BingoResult<TicketCatalog> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| BingoError::TicketSource {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = parse_base(&content);
    if parsed.skipped > 0 {
        log_warning(&format!(
            "Skipped {} malformed lines while reading {}",
            parsed.skipped,
            path.display()
        ));
    }
    let catalog = TicketCatalog::new(parsed.tickets);
    log_info(&format!("Loaded {} tickets from {}", catalog.len(), path.display()));
    Ok(catalog)
}

/// Shares one parsed catalog per source path across all sessions.
/// Entries are inserted once and never modified afterwards.
#[derive(Debug, Default)]
pub struct CatalogCache {
    entries: Mutex<HashMap<PathBuf, Arc<TicketCatalog>>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&self, path: P) -> BingoResult<Arc<TicketCatalog>> {
        let path = path.as_ref();
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        // Held across the parse so concurrent first uses load the file once.
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BingoError::LockPoisoned("catalog cache"))?;
        if let Some(catalog) = entries.get(&key) {
            return Ok(Arc::clone(catalog));
        }
        let catalog = Arc::new(load_catalog(&key)?);
        entries.insert(key, Arc::clone(&catalog));
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_line_with_two_grids() {
        let ticket = parse_line("0000019-011012151922-0203").unwrap();
        assert_eq!(ticket.id, 1);
        assert_eq!(ticket.check_digit, 9);
        assert_eq!(ticket.grids, vec![vec![1, 10, 12, 15, 19, 22], vec![2, 3]]);
    }

    #[test]
    fn test_parse_line_odd_digit_ignored() {
        let ticket = parse_line("0000123-01025").unwrap();
        assert_eq!(ticket.id, 12);
        assert_eq!(ticket.check_digit, 3);
        assert_eq!(ticket.grids, vec![vec![1, 2]]);
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(parse_line("9-0102").is_none());
        assert!(parse_line("00A0019-0102").is_none());
        assert!(parse_line("0000019-01x2").is_none());
    }

    #[test]
    fn test_parse_base_counts_skipped() {
        let content = "0000019-0110\n\n  \nbroken\n0000024-0203\r\n";
        let parsed = parse_base(content);
        assert_eq!(parsed.tickets.len(), 2);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.tickets[1].grids, vec![vec![2, 3]]);
    }

    #[test]
    fn test_cache_shares_catalog_per_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0000019-011012151922").unwrap();
        writeln!(file, "0000024-020304050607").unwrap();

        let cache = CatalogCache::new();
        let first = cache.load(file.path()).unwrap();
        let second = cache.load(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_missing_file_is_error() {
        let cache = CatalogCache::new();
        let result = cache.load("/nonexistent/base-cartelas.txt");
        assert!(matches!(result, Err(BingoError::TicketSource { .. })));
        assert!(cache.is_empty());
    }
}
