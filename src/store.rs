// =============================================================================
// Persistent Store — SQLite-backed price, indicator, and scan-result storage
// =============================================================================
//
// The store is the single source of truth for persisted state.  It enforces
// uniqueness and ordering but carries no business logic.  Every write path is
// wrapped in a transaction per instrument: a merge either fully succeeds or
// leaves prior state unchanged.
//
// Table and column names are stable — external reporting tools query them
// directly by name.
// =============================================================================

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{DailyBar, DateRange, IndicatorSample, ScanRecord};

/// Errors surfaced by the persistence layer.
///
/// A store failure is fatal for the affected instrument's scan pass only —
/// the orchestrator records it and moves on to the next symbol.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS price_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    date DATE NOT NULL,
    open REAL,
    high REAL,
    low REAL,
    close REAL,
    volume INTEGER,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(symbol, date)
);

CREATE TABLE IF NOT EXISTS indicators (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    date DATE NOT NULL,
    oscillator_14 REAL,
    volatility_14 REAL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(symbol, date)
);

CREATE TABLE IF NOT EXISTS scan_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_date DATE NOT NULL,
    symbol TEXT NOT NULL,
    oscillator REAL,
    volatility REAL,
    hit_high BOOLEAN,
    hit_low BOOLEAN,
    is_overextended BOOLEAN DEFAULT 0,
    swing_low REAL,
    overextended_threshold REAL,
    current_price REAL,
    status TEXT,
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS cache_metadata (
    symbol TEXT PRIMARY KEY,
    last_updated TIMESTAMP,
    last_date DATE,
    record_count INTEGER
);

CREATE INDEX IF NOT EXISTS idx_price_symbol_date ON price_data(symbol, date);
CREATE INDEX IF NOT EXISTS idx_indicators_symbol_date ON indicators(symbol, date);
CREATE INDEX IF NOT EXISTS idx_scan_results_date ON scan_results(scan_date);
"#;

/// Cached coverage for one symbol: the contiguous-range assumption is that
/// everything between `start` and `end` that the source ever supplied is
/// stored (gap reconciliation happens in the cache coordinator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub count: usize,
}

/// Row counts and cache health, for the end-of-cycle summary.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub price_rows: usize,
    pub indicator_rows: usize,
    pub scan_rows: usize,
    pub symbols: usize,
    pub fresh_symbols: usize,
}

/// SQLite-backed store.  The connection is guarded by a mutex; the scan cycle
/// is sequential per instrument, so contention is not a concern here.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (used by tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // -------------------------------------------------------------------------
    // Price bars
    // -------------------------------------------------------------------------

    /// Idempotent merge of daily bars keyed by (symbol, date).
    ///
    /// Re-submitting an already-stored bar neither duplicates it nor changes
    /// the row count.  The symbol's freshness metadata is refreshed in the
    /// same transaction: timestamp = now, last date = max stored date, count
    /// = total bars now stored for the symbol.
    pub fn upsert_bars(&self, symbol: &str, bars: &[DailyBar]) -> Result<(), StoreError> {
        if bars.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO price_data (symbol, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(symbol, date) DO UPDATE SET
                     open = excluded.open,
                     high = excluded.high,
                     low = excluded.low,
                     close = excluded.close,
                     volume = excluded.volume",
            )?;
            for bar in bars {
                stmt.execute(params![
                    symbol, bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
                ])?;
            }
        }

        let (count, last_date): (usize, Option<NaiveDate>) = tx.query_row(
            "SELECT COUNT(*), MAX(date) FROM price_data WHERE symbol = ?1",
            params![symbol],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        tx.execute(
            "INSERT INTO cache_metadata (symbol, last_updated, last_date, record_count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(symbol) DO UPDATE SET
                 last_updated = excluded.last_updated,
                 last_date = excluded.last_date,
                 record_count = excluded.record_count",
            params![symbol, Utc::now(), last_date, count],
        )?;

        tx.commit()?;
        debug!(symbol, merged = bars.len(), total = count, "bars merged");
        Ok(())
    }

    /// Bars for `symbol` inside the inclusive range, ascending by date.
    /// Returns an empty vec (never an error) when nothing is stored in range.
    pub fn get_bars(&self, symbol: &str, range: DateRange) -> Result<Vec<DailyBar>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT date, open, high, low, close, volume
             FROM price_data
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;
        let rows = stmt.query_map(params![symbol, range.start, range.end], |row| {
            Ok(DailyBar {
                date: row.get(0)?,
                open: row.get(1)?,
                high: row.get(2)?,
                low: row.get(3)?,
                close: row.get(4)?,
                volume: row.get(5)?,
            })
        })?;
        let bars = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(bars)
    }

    /// Min/max stored date and bar count for `symbol`, or `None` when no bars
    /// exist.
    pub fn coverage(&self, symbol: &str) -> Result<Option<Coverage>, StoreError> {
        let conn = self.conn.lock();
        let (start, end, count): (Option<NaiveDate>, Option<NaiveDate>, usize) = conn.query_row(
            "SELECT MIN(date), MAX(date), COUNT(*) FROM price_data WHERE symbol = ?1",
            params![symbol],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(match (start, end) {
            (Some(start), Some(end)) => Some(Coverage { start, end, count }),
            _ => None,
        })
    }

    // -------------------------------------------------------------------------
    // Indicators
    // -------------------------------------------------------------------------

    /// Idempotent merge of indicator samples keyed by (symbol, date).
    /// Samples with non-finite values are silently dropped, not stored.
    pub fn upsert_indicators(
        &self,
        symbol: &str,
        samples: &[IndicatorSample],
    ) -> Result<(), StoreError> {
        let valid: Vec<&IndicatorSample> = samples
            .iter()
            .filter(|s| s.oscillator.is_finite() && s.volatility.is_finite())
            .collect();
        if valid.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO indicators (symbol, date, oscillator_14, volatility_14)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(symbol, date) DO UPDATE SET
                     oscillator_14 = excluded.oscillator_14,
                     volatility_14 = excluded.volatility_14",
            )?;
            for sample in &valid {
                stmt.execute(params![symbol, sample.date, sample.oscillator, sample.volatility])?;
            }
        }
        tx.commit()?;
        debug!(symbol, stored = valid.len(), "indicator samples merged");
        Ok(())
    }

    /// Indicator samples for `symbol` inside the inclusive range, ascending.
    pub fn get_indicators(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<IndicatorSample>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT date, oscillator_14, volatility_14
             FROM indicators
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;
        let rows = stmt.query_map(params![symbol, range.start, range.end], |row| {
            Ok(IndicatorSample {
                date: row.get(0)?,
                oscillator: row.get(1)?,
                volatility: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -------------------------------------------------------------------------
    // Scan results
    // -------------------------------------------------------------------------

    /// Append-only insert into the scan log.  Rows are never mutated.
    pub fn record_scan_result(&self, record: &ScanRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO scan_results
             (scan_date, symbol, oscillator, volatility, hit_high, hit_low,
              is_overextended, swing_low, overextended_threshold, current_price,
              status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.scan_date,
                record.symbol,
                record.oscillator,
                record.volatility,
                record.hit_high,
                record.hit_low,
                record.is_overextended,
                record.swing_low,
                record.overextended_threshold,
                record.current_price,
                record.status,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    /// Scan log rows from the last `days` days, newest first.
    pub fn scan_history(&self, days: i64) -> Result<Vec<ScanRecord>, StoreError> {
        let cutoff = Utc::now().date_naive() - Duration::days(days);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT scan_date, symbol, oscillator, volatility, hit_high, hit_low,
                    is_overextended, swing_low, overextended_threshold, current_price,
                    status, created_at
             FROM scan_results
             WHERE scan_date >= ?1
             ORDER BY scan_date DESC, symbol ASC",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            Ok(ScanRecord {
                scan_date: row.get(0)?,
                symbol: row.get(1)?,
                oscillator: row.get(2)?,
                volatility: row.get(3)?,
                hit_high: row.get(4)?,
                hit_low: row.get(5)?,
                is_overextended: row.get(6)?,
                swing_low: row.get(7)?,
                overextended_threshold: row.get(8)?,
                current_price: row.get(9)?,
                status: row.get(10)?,
                created_at: row.get(11)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -------------------------------------------------------------------------
    // Freshness & retention
    // -------------------------------------------------------------------------

    /// True iff a freshness record exists and was updated less than
    /// `max_age_days` days ago.
    pub fn is_fresh(&self, symbol: &str, max_age_days: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let last_updated: Option<DateTime<Utc>> = conn
            .query_row(
                "SELECT last_updated FROM cache_metadata WHERE symbol = ?1",
                params![symbol],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match last_updated {
            Some(ts) => Utc::now() - ts < Duration::days(max_age_days),
            None => false,
        })
    }

    /// Delete bars and indicator samples strictly before `cutoff`, and drop
    /// freshness records for symbols left with no bars.  Returns the total
    /// number of rows removed.
    pub fn prune_older_than(&self, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let pruned_bars = tx.execute("DELETE FROM price_data WHERE date < ?1", params![cutoff])?;
        let pruned_indicators =
            tx.execute("DELETE FROM indicators WHERE date < ?1", params![cutoff])?;
        let pruned_metadata = tx.execute(
            "DELETE FROM cache_metadata
             WHERE symbol NOT IN (SELECT DISTINCT symbol FROM price_data)",
            [],
        )?;

        tx.commit()?;

        let total = pruned_bars + pruned_indicators + pruned_metadata;
        if total > 0 {
            info!(
                cutoff = %cutoff,
                bars = pruned_bars,
                indicators = pruned_indicators,
                metadata = pruned_metadata,
                "old cache rows pruned"
            );
        }
        Ok(total)
    }

    // -------------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------------

    /// Row counts plus the number of symbols whose cache is still fresh.
    pub fn stats(&self, max_age_days: i64) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<usize, rusqlite::Error> {
            conn.query_row(sql, [], |row| row.get(0))
        };

        let fresh_cutoff = Utc::now() - Duration::days(max_age_days);
        let fresh_symbols: usize = conn.query_row(
            "SELECT COUNT(*) FROM cache_metadata WHERE last_updated > ?1",
            params![fresh_cutoff],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            price_rows: count("SELECT COUNT(*) FROM price_data")?,
            indicator_rows: count("SELECT COUNT(*) FROM indicators")?,
            scan_rows: count("SELECT COUNT(*) FROM scan_results")?,
            symbols: count("SELECT COUNT(DISTINCT symbol) FROM price_data")?,
            fresh_symbols,
        })
    }
}
