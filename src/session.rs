// src/session.rs
// A live draw session: one engine, its ticket bases and its persisted record.
// Every mutation is persisted before it is acknowledged; when the store
// refuses a write the in-memory change is rolled back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogCache;
use crate::defs::{BaseId, Number, PrizeId, TicketId, REEVALUATE};
use crate::engine::{DrawEngine, TicketKey};
use crate::error::{BingoError, BingoResult};
use crate::logging::{log_error, log_info, log_warning};
use crate::pattern::IndexSet;
use crate::pouch::Pouch;
use crate::prize::{Prize, PrizeDefinition, PrizeKind};
use crate::store::{validate_session_id, BaseSource, SessionRecord, SessionStore};
use crate::ticket::{format_barcode, parse_barcode};

/// A ticket that just joined a prize's winners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerNotice {
    pub prize_id: PrizeId,
    pub prize_name: String,
    pub barcode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOutcome {
    pub number: Number,
    /// Some winner or near-winner list changed
    pub updated: bool,
    pub new_winners: Vec<WinnerNotice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeSnapshot {
    pub id: PrizeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PrizeKind,
    pub base_id: BaseId,
    pub grid_index: usize,
    pub active: bool,
    pub realized: bool,
    /// This is the sequential prize currently being played for
    pub in_turn: bool,
    pub winners: Vec<String>,
    pub near_winners: Vec<String>,
    pub winning_indices: BTreeMap<String, IndexSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySnapshot {
    pub winners: Vec<String>,
    pub near_wins: BTreeMap<usize, Vec<String>>,
}

/// Post-operation state broadcast to displays and operators.
/// Tickets are reported by barcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub name: String,
    pub drawn_numbers: Vec<Number>,
    pub last_number: Option<Number>,
    pub max_balls: Number,
    pub remaining: usize,
    pub registered_count: usize,
    pub legacy: LegacySnapshot,
    pub prizes: Vec<PrizeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub drawn_count: usize,
}

pub struct Session {
    id: String,
    name: String,
    created_at: String,
    bases: Vec<BaseSource>,
    engine: DrawEngine,
    store: Arc<dyn SessionStore>,
}

impl Session {
    /// Rebuild a session from its record: catalogs, prizes and registrations
    /// first, then the drawn balls replayed in order with the persisted
    /// realized flags put back as their prizes get winners.
    pub fn bootstrap(record: SessionRecord, cache: &CatalogCache, store: Arc<dyn SessionStore>) -> BingoResult<Self> {
        let mut engine = DrawEngine::new(record.max_balls, record.open_play);

        let mut seen = BTreeSet::new();
        for base in &record.bases {
            if !seen.insert(base.id) {
                return Err(BingoError::DuplicateBase(base.id));
            }
            engine.add_base(base.id, cache.load(&base.path)?);
        }

        let mut preserved = BTreeSet::new();
        for def in record.prizes {
            if def.realized {
                preserved.insert(def.id);
            }
            engine.add_prize(PrizeDefinition { realized: false, ..def });
        }
        for &ticket in &record.registered {
            engine.register_ticket(ticket);
        }

        engine.replay(&record.drawn, &preserved);
        // Prizes closed by the operator without any winner
        for &prize_id in &preserved {
            if engine.prize(prize_id).is_some_and(|p| !p.realized) {
                engine.set_prize_status(prize_id, true);
            }
        }

        log_info(&format!(
            "Session '{}' ready: {} bases, {} prizes, {} registered tickets, {} balls drawn",
            record.id,
            record.bases.len(),
            engine.prizes().len(),
            engine.registered().len(),
            engine.drawn_numbers().len()
        ));

        Ok(Self {
            id: record.id,
            name: record.name,
            created_at: record.created_at,
            bases: record.bases,
            engine,
            store,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &DrawEngine {
        &self.engine
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at.clone(),
            drawn_count: self.engine.drawn_numbers().len(),
        }
    }

    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at.clone(),
            max_balls: self.engine.max_balls(),
            open_play: self.engine.is_open_play(),
            bases: self.bases.clone(),
            prizes: self.engine.prizes().iter().map(Prize::definition).collect(),
            registered: self.engine.registered().iter().copied().collect(),
            drawn: self.engine.drawn_numbers().to_vec(),
        }
    }

    fn persist(&self) -> BingoResult<()> {
        self.store.save(&self.record()).inspect_err(|e| {
            log_error(&format!("Failed to persist session '{}': {e}", self.id));
        })
    }

    /// Persist, or put the engine back the way it was.
    fn commit(&mut self, previous: DrawEngine) -> BingoResult<()> {
        if let Err(e) = self.persist() {
            self.engine = previous;
            return Err(e);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Draws
    // ---------------------------------------------------------------

    pub fn draw(&mut self, number: Number) -> BingoResult<DrawOutcome> {
        if !self.engine.would_accept(number) {
            log_warning(&format!("Session '{}': number {number} ignored", self.id));
            return Err(BingoError::DrawRejected(number));
        }

        let before = self.winner_counts();
        let previous = self.engine.clone();
        let updated = self.engine.process_number(number);
        self.commit(previous)?;

        log_info(&format!(
            "Session '{}': number {number} drawn ({} of {})",
            self.id,
            self.engine.drawn_numbers().len(),
            self.engine.max_balls()
        ));
        let new_winners = self.new_winners(&before);
        for notice in &new_winners {
            log_info(&format!(
                "BINGO! Session '{}': prize '{}' won by ticket {}",
                self.id, notice.prize_name, notice.barcode
            ));
        }

        Ok(DrawOutcome { number, updated, new_winners })
    }

    /// Pick a random ball from those left and draw it.
    pub fn draw_random(&mut self) -> BingoResult<DrawOutcome> {
        let mut pouch = Pouch::remaining(self.engine.max_balls(), self.engine.drawn_numbers());
        match pouch.extract() {
            Some(number) => self.draw(number),
            None => Err(BingoError::DrawRejected(REEVALUATE)),
        }
    }

    /// Cancel the last ball. Prizes the operator already closed stay closed
    /// unless the cancelled ball was what gave them winners.
    pub fn undo(&mut self) -> BingoResult<Number> {
        let realized = self.engine.realized_prize_ids();
        let previous = self.engine.clone();
        let Some(number) = self.engine.undo_last_number(&realized) else {
            return Err(BingoError::NothingToUndo);
        };
        self.commit(previous)?;
        log_info(&format!("Session '{}': number {number} cancelled", self.id));
        Ok(number)
    }

    pub fn start_new_game(&mut self) -> BingoResult<()> {
        let previous = self.engine.clone();
        self.engine.start_new_game();
        self.commit(previous)?;
        log_info(&format!("Session '{}': new game started", self.id));
        Ok(())
    }

    // ---------------------------------------------------------------
    // Sales
    // ---------------------------------------------------------------

    fn ticket_from_barcode(&self, barcode: &str) -> BingoResult<TicketId> {
        let (ticket_id, digit) = parse_barcode(barcode)?;
        let valid = self
            .engine
            .bases()
            .any(|(_, catalog)| catalog.is_valid_check_digit(ticket_id, digit));
        if !valid {
            return Err(BingoError::InvalidBarcode(barcode.trim().to_string()));
        }
        Ok(ticket_id)
    }

    /// Register a sold ticket by its scanned barcode. Returns false if it
    /// was already registered.
    pub fn register_barcode(&mut self, barcode: &str) -> BingoResult<bool> {
        let ticket_id = self.ticket_from_barcode(barcode)?;
        let previous = self.engine.clone();
        if !self.engine.register_ticket(ticket_id) {
            return Ok(false);
        }
        self.engine.process_number(REEVALUATE);
        self.commit(previous)?;
        log_info(&format!("Session '{}': ticket {} registered", self.id, barcode.trim()));
        Ok(true)
    }

    /// Register up to `count` random unsold tickets from the session's bases.
    pub fn register_random(&mut self, count: usize) -> BingoResult<Vec<String>> {
        let all: BTreeSet<TicketId> = self
            .engine
            .bases()
            .flat_map(|(_, catalog)| catalog.tickets().iter().map(|t| t.id))
            .collect();
        let mut candidates: Vec<TicketId> = all
            .into_iter()
            .filter(|id| !self.engine.is_registered(*id))
            .collect();
        candidates.shuffle(&mut rand::rng());
        candidates.truncate(count);

        if candidates.is_empty() {
            log_warning(&format!("Session '{}': no unsold tickets left to register", self.id));
            return Ok(Vec::new());
        }

        let previous = self.engine.clone();
        for &ticket_id in &candidates {
            self.engine.register_ticket(ticket_id);
        }
        self.engine.process_number(REEVALUATE);
        self.commit(previous)?;

        log_info(&format!("Session '{}': {} random tickets registered", self.id, candidates.len()));
        Ok(candidates.iter().map(|&id| self.barcode_any_base(id)).collect())
    }

    pub fn unregister_barcode(&mut self, barcode: &str) -> BingoResult<bool> {
        let ticket_id = self.ticket_from_barcode(barcode)?;
        let previous = self.engine.clone();
        if !self.engine.unregister_ticket(ticket_id) {
            return Ok(false);
        }
        self.commit(previous)?;
        log_info(&format!("Session '{}': ticket {} unregistered", self.id, barcode.trim()));
        Ok(true)
    }

    /// Drop every registration. Returns how many tickets were registered.
    pub fn clear_sales(&mut self) -> BingoResult<usize> {
        let count = self.engine.registered().len();
        let previous = self.engine.clone();
        self.engine.clear_registered();
        self.commit(previous)?;
        log_info(&format!("Session '{}': sales list cleared ({count} tickets)", self.id));
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Prizes
    // ---------------------------------------------------------------

    pub fn add_prize(&mut self, def: PrizeDefinition) -> BingoResult<bool> {
        if self.engine.catalog(def.base_id).is_none() {
            log_warning(&format!(
                "Session '{}': prize '{}' refers to unknown base {}",
                self.id, def.name, def.base_id
            ));
        }
        let name = def.name.clone();
        let previous = self.engine.clone();
        if !self.engine.add_prize(def) {
            return Ok(false);
        }
        self.commit(previous)?;
        log_info(&format!("Session '{}': prize '{name}' added", self.id));
        Ok(true)
    }

    /// Close or reopen a prize. Closing a sequential prize passes the turn on.
    pub fn set_prize_status(&mut self, prize_id: PrizeId, realized: bool) -> BingoResult<bool> {
        let previous = self.engine.clone();
        let before = self.winner_counts();
        let changed = self
            .engine
            .set_prize_status(prize_id, realized)
            .ok_or(BingoError::PrizeNotFound(prize_id))?;
        self.commit(previous)?;

        let status = if realized { "realized" } else { "reopened" };
        log_info(&format!("Session '{}': prize {prize_id} {status}", self.id));
        for notice in self.new_winners(&before) {
            log_info(&format!(
                "BINGO! Session '{}': prize '{}' won by ticket {}",
                self.id, notice.prize_name, notice.barcode
            ));
        }
        Ok(changed)
    }

    // ---------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------

    fn winner_counts(&self) -> Vec<usize> {
        self.engine.prizes().iter().map(|p| p.winners.len()).collect()
    }

    fn new_winners(&self, before: &[usize]) -> Vec<WinnerNotice> {
        let mut notices = Vec::new();
        for (prize, &seen) in self.engine.prizes().iter().zip(before) {
            for &ticket in prize.winners.iter().skip(seen) {
                notices.push(WinnerNotice {
                    prize_id: prize.id,
                    prize_name: prize.name.clone(),
                    barcode: self.barcode(prize.base_id, ticket),
                });
            }
        }
        notices
    }

    fn barcode(&self, base_id: BaseId, ticket_id: TicketId) -> String {
        match self.engine.catalog(base_id) {
            Some(catalog) => catalog.formatted_barcode(ticket_id),
            None => format_barcode(ticket_id, 0),
        }
    }

    fn barcode_any_base(&self, ticket_id: TicketId) -> String {
        match self.engine.base_of_ticket(ticket_id) {
            Some(base_id) => self.barcode(base_id, ticket_id),
            None => format_barcode(ticket_id, 0),
        }
    }

    fn key_barcodes(&self, keys: &[TicketKey]) -> Vec<String> {
        keys.iter().map(|k| self.barcode(k.base_id, k.ticket_id)).collect()
    }

    fn prize_snapshot(&self, prize: &Prize, turn: Option<PrizeId>) -> PrizeSnapshot {
        PrizeSnapshot {
            id: prize.id,
            name: prize.name.clone(),
            kind: prize.kind,
            base_id: prize.base_id,
            grid_index: prize.grid_index,
            active: prize.active,
            realized: prize.realized,
            in_turn: turn == Some(prize.id),
            winners: prize.winners.iter().map(|&t| self.barcode(prize.base_id, t)).collect(),
            near_winners: prize.near_winners.iter().map(|&t| self.barcode(prize.base_id, t)).collect(),
            winning_indices: prize
                .winner_patterns
                .iter()
                .map(|(&t, indices)| (self.barcode(prize.base_id, t), indices.clone()))
                .collect(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let turn = self.engine.sequential_turn();
        let legacy = self.engine.legacy();
        let drawn = self.engine.drawn_numbers();
        SessionSnapshot {
            session_id: self.id.clone(),
            name: self.name.clone(),
            drawn_numbers: drawn.to_vec(),
            last_number: self.engine.last_number(),
            max_balls: self.engine.max_balls(),
            remaining: usize::from(self.engine.max_balls()).saturating_sub(drawn.len()),
            registered_count: self.engine.registered().len(),
            legacy: LegacySnapshot {
                winners: self.key_barcodes(&legacy.winners),
                near_wins: legacy
                    .near_wins
                    .iter()
                    .map(|(&missing, keys)| (missing, self.key_barcodes(keys)))
                    .collect(),
            },
            prizes: self.engine.prizes().iter().map(|p| self.prize_snapshot(p, turn)).collect(),
        }
    }
}

/// All live sessions, each behind its own mutex so draws in different
/// sessions never wait on each other.
pub struct SessionRegistry {
    sessions: Mutex<BTreeMap<String, Arc<Mutex<Session>>>>,
    cache: CatalogCache,
    store: Arc<dyn SessionStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            cache: CatalogCache::new(),
            store,
        }
    }

    /// Bootstrap every stored session. Sessions that fail to load are
    /// logged and skipped. Returns how many were loaded.
    pub fn load_all(&self) -> BingoResult<usize> {
        let records = self.store.load_all()?;
        let mut loaded = 0;
        for record in records {
            let id = record.id.clone();
            match Session::bootstrap(record, &self.cache, Arc::clone(&self.store)) {
                Ok(session) => {
                    self.insert(session)?;
                    loaded += 1;
                }
                Err(e) => log_error(&format!("Could not load session '{id}': {e}")),
            }
        }
        Ok(loaded)
    }

    fn insert(&self, session: Session) -> BingoResult<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.lock().map_err(|_| BingoError::LockPoisoned("session registry"))?;
        if sessions.contains_key(session.id()) {
            return Err(BingoError::SessionExists(session.id().to_string()));
        }
        let id = session.id().to_string();
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Create and persist a new session.
    pub fn create(&self, mut record: SessionRecord) -> BingoResult<Arc<Mutex<Session>>> {
        validate_session_id(&record.id)?;
        if self.contains(&record.id) {
            return Err(BingoError::SessionExists(record.id));
        }
        if record.created_at.is_empty() {
            record.created_at = crate::store::now_string();
        }
        let session = Session::bootstrap(record, &self.cache, Arc::clone(&self.store))?;
        session.persist()?;
        log_info(&format!("Session '{}' created", session.id()));
        self.insert(session)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().map(|s| s.contains_key(id)).unwrap_or(false)
    }

    pub fn get(&self, id: &str) -> BingoResult<Arc<Mutex<Session>>> {
        let sessions = self.sessions.lock().map_err(|_| BingoError::LockPoisoned("session registry"))?;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| BingoError::SessionNotFound(id.to_string()))
    }

    pub fn list(&self) -> BingoResult<Vec<SessionSummary>> {
        let handles: Vec<Arc<Mutex<Session>>> = {
            let sessions = self.sessions.lock().map_err(|_| BingoError::LockPoisoned("session registry"))?;
            sessions.values().cloned().collect()
        };
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let session = handle.lock().map_err(|_| BingoError::LockPoisoned("session"))?;
            summaries.push(session.summary());
        }
        Ok(summaries)
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }
}
