//! Shared SQLite PRAGMA tuning
//!
//! Applied to every connection so the writer and ad-hoc readers see the
//! same journal mode and cache settings.

use rusqlite::Connection;

/// Apply optimized PRAGMAs (WAL, NORMAL, MEMORY, mmap, cache, autocheckpoint)
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    // WAL keeps readers from blocking the single writer
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 268_435_456_i64)?;
    // Negative cache_size is in KiB
    conn.pragma_update(None, "cache_size", -65_536_i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1_000_i64)?;
    Ok(())
}
