//! Shared SQLite tuning for the write-heavy tick store.

use rusqlite::Connection;

/// Apply the connection pragmas used by every handle on the tick database:
/// WAL journaling, relaxed fsync, in-memory temp tables and a busy timeout so
/// concurrent readers back off instead of failing. A small bounded post-crash
/// loss is an accepted tradeoff for write throughput.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA temp_store=MEMORY;
         PRAGMA busy_timeout=5000;
         PRAGMA wal_autocheckpoint=1000;
         PRAGMA cache_size=-64000;",
    )
}
