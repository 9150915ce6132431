//! SQLite schema versions.
//!
//! Applied versions are recorded in `schema_migrations`; all pending steps
//! run inside one transaction.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, StoreError};

/// Schema steps, in order. Entry `i` moves the schema to version `i + 1`.
const MIGRATIONS: &[&str] = &[V1_LEDGER];

/// Current schema version.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`].
///
/// Running it against an up-to-date database does nothing. A database
/// written by a newer build is refused.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: u32 = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<u32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "schema version {applied} was written by a newer build (this build knows {CURRENT_VERSION})"
        )));
    }

    let pending = &MIGRATIONS[applied as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (offset, sql) in pending.iter().enumerate() {
        let version = applied + offset as u32 + 1;
        tx.execute_batch(sql)
            .map_err(|e| StoreError::Migration(format!("step {version}: {e}")))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, unix_seconds()],
        )?;
        tracing::debug!(version, "schema migrated");
    }
    tx.commit()?;

    Ok(())
}

/// Ledger records and the event journal.
///
/// Amounts and share quantities are u128 stored as 16-byte big-endian
/// blobs. Ticks and counts are u64 stored as INTEGER.
const V1_LEDGER: &str = r#"
    CREATE TABLE channels (
        owner BLOB PRIMARY KEY,            -- 20 bytes
        channel_type INTEGER NOT NULL,
        pool_contribution BLOB NOT NULL,   -- u128 BE
        member_count INTEGER NOT NULL,
        fs_count BLOB NOT NULL,            -- ShareUnits raw, u128 BE
        fs_historical BLOB NOT NULL,       -- ShareUnits raw, u128 BE
        fs_last_update INTEGER NOT NULL,
        activated INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        yield_paid BLOB NOT NULL           -- u128 BE
    );

    CREATE TABLE users (
        address BLOB PRIMARY KEY,          -- 20 bytes
        activated INTEGER NOT NULL,
        start_tick INTEGER NOT NULL,
        channellized INTEGER NOT NULL,
        subscribed_count INTEGER NOT NULL,
        public_key BLOB,                   -- 64 bytes, nullable
        nonce INTEGER NOT NULL
    );

    CREATE TABLE memberships (
        channel BLOB NOT NULL,
        user BLOB NOT NULL,
        active INTEGER NOT NULL,
        since INTEGER NOT NULL,
        PRIMARY KEY (channel, user)
    );

    CREATE TABLE delegates (
        channel BLOB NOT NULL,
        delegate BLOB NOT NULL,
        PRIMARY KEY (channel, delegate)
    );

    CREATE TABLE events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        body BLOB NOT NULL                 -- CBOR-encoded Event
    );

    CREATE INDEX idx_memberships_active ON memberships(channel, active);
    CREATE INDEX idx_users_activated ON users(activated);
"#;

fn unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
