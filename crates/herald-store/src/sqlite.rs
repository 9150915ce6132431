//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the ledger. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use herald_core::{
    Address, Amount, Channel, ChannelType, Event, FairShare, Membership, PublicKey, ShareUnits,
    User,
};

use crate::batch::{Write, WriteBatch};
use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{JournalEntry, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(format!("connection mutex: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column codecs
// ─────────────────────────────────────────────────────────────────────────────

fn u128_to_blob(value: u128) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

fn blob_to_u128(blob: &[u8], column: &str) -> Result<u128> {
    let arr: [u8; 16] = blob
        .try_into()
        .map_err(|_| StoreError::InvalidData(format!("{column}: expected 16 bytes, got {}", blob.len())))?;
    Ok(u128::from_be_bytes(arr))
}

fn u64_to_sql(value: u64, column: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column}: {value} exceeds INTEGER range")))
}

fn sql_to_u64(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column}: negative value {value}")))
}

fn blob_to_address(blob: &[u8], column: &str) -> Result<Address> {
    Address::try_from(blob)
        .map_err(|_| StoreError::InvalidData(format!("{column}: expected 20-byte address")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw rows
// ─────────────────────────────────────────────────────────────────────────────

struct ChannelRow {
    owner: Vec<u8>,
    channel_type: u8,
    pool_contribution: Vec<u8>,
    member_count: i64,
    fs_count: Vec<u8>,
    fs_historical: Vec<u8>,
    fs_last_update: i64,
    activated: bool,
    created_at: i64,
    yield_paid: Vec<u8>,
}

impl ChannelRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner: row.get("owner")?,
            channel_type: row.get("channel_type")?,
            pool_contribution: row.get("pool_contribution")?,
            member_count: row.get("member_count")?,
            fs_count: row.get("fs_count")?,
            fs_historical: row.get("fs_historical")?,
            fs_last_update: row.get("fs_last_update")?,
            activated: row.get("activated")?,
            created_at: row.get("created_at")?,
            yield_paid: row.get("yield_paid")?,
        })
    }

    fn into_channel(self) -> Result<Channel> {
        let channel_type = ChannelType::from_u8(self.channel_type).ok_or_else(|| {
            StoreError::InvalidData(format!("channel_type: unknown value {}", self.channel_type))
        })?;
        let pool_contribution: Amount = blob_to_u128(&self.pool_contribution, "pool_contribution")?;
        Ok(Channel {
            owner: blob_to_address(&self.owner, "owner")?,
            channel_type,
            pool_contribution,
            member_count: sql_to_u64(self.member_count, "member_count")?,
            fair_share: FairShare {
                count: ShareUnits::from_raw(blob_to_u128(&self.fs_count, "fs_count")?),
                historical_index: ShareUnits::from_raw(blob_to_u128(
                    &self.fs_historical,
                    "fs_historical",
                )?),
                last_update: sql_to_u64(self.fs_last_update, "fs_last_update")?,
            },
            activated: self.activated,
            created_at: sql_to_u64(self.created_at, "created_at")?,
            yield_paid: blob_to_u128(&self.yield_paid, "yield_paid")?,
        })
    }
}

struct UserRow {
    activated: bool,
    start_tick: i64,
    channellized: bool,
    subscribed_count: i64,
    public_key: Option<Vec<u8>>,
    nonce: i64,
}

impl UserRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            activated: row.get("activated")?,
            start_tick: row.get("start_tick")?,
            channellized: row.get("channellized")?,
            subscribed_count: row.get("subscribed_count")?,
            public_key: row.get("public_key")?,
            nonce: row.get("nonce")?,
        })
    }

    fn into_user(self) -> Result<User> {
        let public_key = self
            .public_key
            .map(|bytes| {
                PublicKey::from_slice(&bytes)
                    .map_err(|_| StoreError::InvalidData("public_key: expected 64 bytes".into()))
            })
            .transpose()?;
        Ok(User {
            activated: self.activated,
            start_tick: sql_to_u64(self.start_tick, "start_tick")?,
            channellized: self.channellized,
            subscribed_count: sql_to_u64(self.subscribed_count, "subscribed_count")?,
            public_key,
            nonce: sql_to_u64(self.nonce, "nonce")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch application
// ─────────────────────────────────────────────────────────────────────────────

fn apply_write(tx: &Transaction<'_>, write: &Write) -> Result<()> {
    match write {
        Write::PutChannel(ch) => {
            tx.execute(
                "INSERT OR REPLACE INTO channels (
                    owner, channel_type, pool_contribution, member_count,
                    fs_count, fs_historical, fs_last_update,
                    activated, created_at, yield_paid
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    ch.owner.as_bytes().as_slice(),
                    ch.channel_type.to_u8(),
                    u128_to_blob(ch.pool_contribution),
                    u64_to_sql(ch.member_count, "member_count")?,
                    u128_to_blob(ch.fair_share.count.raw()),
                    u128_to_blob(ch.fair_share.historical_index.raw()),
                    u64_to_sql(ch.fair_share.last_update, "fs_last_update")?,
                    ch.activated,
                    u64_to_sql(ch.created_at, "created_at")?,
                    u128_to_blob(ch.yield_paid),
                ],
            )?;
        }
        Write::DeleteChannel(owner) => {
            tx.execute(
                "DELETE FROM channels WHERE owner = ?1",
                params![owner.as_bytes().as_slice()],
            )?;
        }
        Write::PutUser { address, user } => {
            tx.execute(
                "INSERT OR REPLACE INTO users (
                    address, activated, start_tick, channellized,
                    subscribed_count, public_key, nonce
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    address.as_bytes().as_slice(),
                    user.activated,
                    u64_to_sql(user.start_tick, "start_tick")?,
                    user.channellized,
                    u64_to_sql(user.subscribed_count, "subscribed_count")?,
                    user.public_key.as_ref().map(|pk| pk.as_bytes().to_vec()),
                    u64_to_sql(user.nonce, "nonce")?,
                ],
            )?;
        }
        Write::DeleteUser(address) => {
            tx.execute(
                "DELETE FROM users WHERE address = ?1",
                params![address.as_bytes().as_slice()],
            )?;
        }
        Write::PutMembership {
            channel,
            user,
            membership,
        } => {
            tx.execute(
                "INSERT OR REPLACE INTO memberships (channel, user, active, since)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    channel.as_bytes().as_slice(),
                    user.as_bytes().as_slice(),
                    membership.exists,
                    u64_to_sql(membership.since, "since")?,
                ],
            )?;
        }
        Write::DeleteMembership { channel, user } => {
            tx.execute(
                "DELETE FROM memberships WHERE channel = ?1 AND user = ?2",
                params![channel.as_bytes().as_slice(), user.as_bytes().as_slice()],
            )?;
        }
        Write::SetDelegate {
            channel,
            delegate,
            allowed,
        } => {
            let sql = if *allowed {
                "INSERT OR IGNORE INTO delegates (channel, delegate) VALUES (?1, ?2)"
            } else {
                "DELETE FROM delegates WHERE channel = ?1 AND delegate = ?2"
            };
            tx.execute(
                sql,
                params![channel.as_bytes().as_slice(), delegate.as_bytes().as_slice()],
            )?;
        }
        Write::AppendEvent { seq, event } => {
            let head = journal_head(tx)?;
            if *seq != head + 1 {
                return Err(StoreError::InvalidData(format!(
                    "append at seq {seq} does not follow head {head}"
                )));
            }
            let body = event
                .to_cbor()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            tx.execute(
                "INSERT INTO events (seq, name, body) VALUES (?1, ?2, ?3)",
                params![u64_to_sql(*seq, "seq")?, event.name(), body],
            )?;
        }
        Write::RetractEvent(seq) => {
            let head = journal_head(tx)?;
            if *seq != head || head == 0 {
                return Err(StoreError::InvalidData(format!(
                    "retraction of seq {seq} but head is {head}"
                )));
            }
            tx.execute(
                "DELETE FROM events WHERE seq = ?1",
                params![u64_to_sql(*seq, "seq")?],
            )?;
        }
    }
    Ok(())
}

fn journal_head(conn: &Connection) -> Result<u64> {
    let head: i64 =
        conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM events", [], |row| row.get(0))?;
    sql_to_u64(head, "seq")
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_channel(&self, owner: &Address) -> Result<Option<Channel>> {
        let owner = *owner;
        self.run(move |conn| {
            conn.query_row(
                "SELECT * FROM channels WHERE owner = ?1",
                params![owner.as_bytes().as_slice()],
                ChannelRow::read,
            )
            .optional()?
            .map(ChannelRow::into_channel)
            .transpose()
        })
        .await
    }

    async fn get_user(&self, address: &Address) -> Result<Option<User>> {
        let address = *address;
        self.run(move |conn| {
            conn.query_row(
                "SELECT activated, start_tick, channellized, subscribed_count, public_key, nonce
                 FROM users WHERE address = ?1",
                params![address.as_bytes().as_slice()],
                UserRow::read,
            )
            .optional()?
            .map(UserRow::into_user)
            .transpose()
        })
        .await
    }

    async fn get_membership(
        &self,
        channel: &Address,
        user: &Address,
    ) -> Result<Option<Membership>> {
        let (channel, user) = (*channel, *user);
        self.run(move |conn| {
            let row: Option<(bool, i64)> = conn
                .query_row(
                    "SELECT active, since FROM memberships WHERE channel = ?1 AND user = ?2",
                    params![channel.as_bytes().as_slice(), user.as_bytes().as_slice()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(exists, since)| {
                Ok(Membership {
                    exists,
                    since: sql_to_u64(since, "since")?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn is_delegate(&self, channel: &Address, delegate: &Address) -> Result<bool> {
        let (channel, delegate) = (*channel, *delegate);
        self.run(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM delegates WHERE channel = ?1 AND delegate = ?2",
                    params![channel.as_bytes().as_slice(), delegate.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn list_channels(&self) -> Result<Vec<Address>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT owner FROM channels ORDER BY owner")?;
            let blobs = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            blobs.iter().map(|b| blob_to_address(b, "owner")).collect()
        })
        .await
    }

    async fn list_members(&self, channel: &Address) -> Result<Vec<Address>> {
        let channel = *channel;
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user FROM memberships WHERE channel = ?1 AND active = 1 ORDER BY user",
            )?;
            let blobs = stmt
                .query_map(params![channel.as_bytes().as_slice()], |row| {
                    row.get::<_, Vec<u8>>(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            blobs.iter().map(|b| blob_to_address(b, "user")).collect()
        })
        .await
    }

    async fn users_count(&self) -> Result<u64> {
        self.run(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM users WHERE activated = 1", [], |row| {
                    row.get(0)
                })?;
            sql_to_u64(n, "users_count")
        })
        .await
    }

    async fn channels_count(&self) -> Result<u64> {
        self.run(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))?;
            sql_to_u64(n, "channels_count")
        })
        .await
    }

    async fn commit(&self, batch: &WriteBatch) -> Result<()> {
        let batch = batch.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            for write in batch.writes() {
                apply_write(&tx, write)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn journal_head(&self) -> Result<u64> {
        self.run(|conn| journal_head(conn)).await
    }

    async fn events_since(&self, after_seq: u64) -> Result<Vec<JournalEntry>> {
        let after = u64_to_sql(after_seq, "seq")?;
        self.run(move |conn| {
            let mut stmt = conn.prepare("SELECT seq, body FROM events WHERE seq > ?1 ORDER BY seq")?;
            let rows = stmt
                .query_map(params![after], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(seq, body)| {
                    let event = Event::from_cbor(&body)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?;
                    Ok(JournalEntry {
                        seq: sql_to_u64(seq, "seq")?,
                        event,
                    })
                })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use herald_core::Keypair;
    use tempfile::tempdir;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn sample_channel() -> Channel {
        let mut ch = Channel::new(addr(1), ChannelType::InterestBearingMutual, 0, 100);
        // Values above u64::MAX exercise the 16-byte encoding.
        ch.pool_contribution = 50 * 10u128.pow(18) * 250_000;
        ch.yield_paid = u64::MAX as u128 + 7;
        ch.member_count = 3;
        ch.fair_share.historical_index = ShareUnits::from_whole(150);
        ch
    }

    #[tokio::test]
    async fn test_sqlite_channel_preserves_wide_amounts() {
        let store = SqliteStore::open_memory().unwrap();
        let ch = sample_channel();

        let mut batch = WriteBatch::new();
        batch.push(Write::PutChannel(ch.clone()));
        store.commit(&batch).await.unwrap();

        assert_eq!(store.get_channel(&addr(1)).await.unwrap(), Some(ch));
        assert!(store.get_channel(&addr(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_user_with_public_key() {
        let store = SqliteStore::open_memory().unwrap();
        let kp = Keypair::generate();
        let user = User {
            activated: true,
            start_tick: 42,
            channellized: false,
            subscribed_count: 2,
            public_key: Some(kp.public_key()),
            nonce: 5,
        };

        let mut batch = WriteBatch::new();
        batch.push(Write::PutUser {
            address: kp.address(),
            user: user.clone(),
        });
        batch.push(Write::PutUser {
            address: addr(9),
            user: User::default(),
        });
        store.commit(&batch).await.unwrap();

        assert_eq!(store.get_user(&kp.address()).await.unwrap(), Some(user));
        assert_eq!(store.users_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_failed_batch_leaves_no_trace() {
        let store = SqliteStore::open_memory().unwrap();
        let mut bad = sample_channel();
        bad.created_at = u64::MAX;

        let mut batch = WriteBatch::new();
        batch.push(Write::PutMembership {
            channel: addr(1),
            user: addr(2),
            membership: Membership::joined(3),
        });
        batch.push(Write::PutChannel(bad));

        assert!(matches!(
            store.commit(&batch).await,
            Err(StoreError::InvalidData(_))
        ));
        assert!(store.get_membership(&addr(1), &addr(2)).await.unwrap().is_none());
        assert_eq!(store.channels_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_membership_and_delegates() {
        let store = SqliteStore::open_memory().unwrap();
        let mut batch = WriteBatch::new();
        batch.push(Write::PutMembership {
            channel: addr(1),
            user: addr(2),
            membership: Membership::joined(3),
        });
        batch.push(Write::SetDelegate {
            channel: addr(1),
            delegate: addr(4),
            allowed: true,
        });
        store.commit(&batch).await.unwrap();

        assert_eq!(
            store.get_membership(&addr(1), &addr(2)).await.unwrap(),
            Some(Membership::joined(3))
        );
        assert_eq!(store.list_members(&addr(1)).await.unwrap(), vec![addr(2)]);
        assert!(store.is_delegate(&addr(1), &addr(4)).await.unwrap());

        let mut revoke = WriteBatch::new();
        revoke.push(Write::SetDelegate {
            channel: addr(1),
            delegate: addr(4),
            allowed: false,
        });
        store.commit(&revoke).await.unwrap();
        assert!(!store.is_delegate(&addr(1), &addr(4)).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("herald.db");
        let ev = Event::SendNotification {
            channel: addr(1),
            recipient: addr(2),
            identity: Bytes::from_static(b"1+payload"),
        };

        {
            let store = SqliteStore::open(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch.push(Write::PutChannel(sample_channel()));
            batch.push(Write::AppendEvent {
                seq: 1,
                event: ev.clone(),
            });
            store.commit(&batch).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_channel(&addr(1)).await.unwrap(), Some(sample_channel()));
        let journal = store.events_since(0).await.unwrap();
        assert_eq!(journal, vec![JournalEntry { seq: 1, event: ev }]);
    }

    #[tokio::test]
    async fn test_sqlite_journal_retraction_reuses_seq() {
        let store = SqliteStore::open_memory().unwrap();
        let ev = |b| Event::ChannelDeactivated { owner: addr(b) };

        let mut batch = WriteBatch::new();
        batch.push(Write::AppendEvent { seq: 1, event: ev(1) });
        batch.push(Write::AppendEvent { seq: 2, event: ev(2) });
        store.commit(&batch).await.unwrap();

        let mut undo = WriteBatch::new();
        undo.push(Write::RetractEvent(2));
        store.commit(&undo).await.unwrap();
        assert_eq!(store.journal_head().await.unwrap(), 1);

        // AUTOINCREMENT must not push the next entry past the freed seq.
        let mut batch = WriteBatch::new();
        batch.push(Write::AppendEvent { seq: 2, event: ev(7) });
        store.commit(&batch).await.unwrap();
        assert_eq!(
            store.events_since(1).await.unwrap(),
            vec![JournalEntry { seq: 2, event: ev(7) }]
        );
    }

    #[tokio::test]
    async fn test_sqlite_journal_gap_rolls_back_batch() {
        let store = SqliteStore::open_memory().unwrap();
        let mut batch = WriteBatch::new();
        batch.push(Write::PutChannel(sample_channel()));
        batch.push(Write::AppendEvent {
            seq: 5,
            event: Event::ChannelDeactivated { owner: addr(1) },
        });

        assert!(matches!(
            store.commit(&batch).await,
            Err(StoreError::InvalidData(_))
        ));
        assert_eq!(store.channels_count().await.unwrap(), 0);
        assert_eq!(store.journal_head().await.unwrap(), 0);
    }
}
