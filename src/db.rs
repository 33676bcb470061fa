use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::seq::IteratorRandom;
use tokio::sync::{mpsc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::obj::RedisObject;
use crate::pattern::Pattern;

///
/// Databases: keyed storage, expirations and the change counter that
/// drives save points.
///

pub const DEFAULT_DBNUM: usize = 16;

/// expiration wake-ups coalesce onto 10 ms ticks
const SWEEP_TICK_MS: i64 = 10;

/// `save <seconds> <changes>` pair, as in the classic config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveParam {
    pub seconds: u64,
    pub changes: u64,
}

/// Invoked (while the write lock is held) when a save point matches the
/// change counter; the snapshot manager registers one per database. The
/// hook must not touch the database lock: it hands the delay off to the
/// snapshot work stream and returns.
pub type SavePointHook = Arc<dyn Fn(Duration) + Send + Sync>;

pub struct RedisDB {
    dict: HashMap<Bytes, RedisObject>,
    expires: HashMap<Bytes, DateTime<Utc>>,
    id: usize,
    dirty: u64,
    save_params: Arc<Vec<SaveParam>>,
    on_save_point: Option<SavePointHook>,
}

impl RedisDB {
    pub fn new(id: usize, save_params: Arc<Vec<SaveParam>>, on_save_point: Option<SavePointHook>) -> RedisDB {
        RedisDB {
            dict: HashMap::new(),
            expires: HashMap::new(),
            id,
            dirty: 0,
            save_params,
            on_save_point,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The keyspace for this DB.
    pub fn dict(&self) -> &HashMap<Bytes, RedisObject> {
        &self.dict
    }

    /// Timeout of keys with a timeout set.
    pub fn expires(&self) -> &HashMap<Bytes, DateTime<Utc>> {
        &self.expires
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.dict.contains_key(key)
    }

    pub fn lookup(&self, key: &[u8]) -> Option<&RedisObject> {
        self.dict.get(key)
    }

    pub fn lookup_mut(&mut self, key: &[u8]) -> Option<&mut RedisObject> {
        self.dict.get_mut(key)
    }

    pub fn insert(&mut self, key: Bytes, obj: RedisObject) -> Option<RedisObject> {
        self.dict.insert(key, obj)
    }

    /// Removing the value removes the expiration with it.
    pub fn remove(&mut self, key: &[u8]) -> Option<RedisObject> {
        self.expires.remove(key);
        self.dict.remove(key)
    }

    /// Move `src` to `dst`, carrying the source's expiration over the
    /// destination's (including "no expiration"). Renaming a key onto
    /// itself succeeds and changes nothing. Returns false when the
    /// source is missing.
    pub fn rename(&mut self, src: &[u8], dst: Bytes) -> bool {
        if !self.dict.contains_key(src) {
            return false;
        }
        if src == &dst[..] {
            return true;
        }
        let value = self.dict.remove(src).expect("source checked above");
        let expire = self.expires.remove(src);
        self.dict.insert(dst.clone(), value);
        match expire {
            Some(at) => {
                self.expires.insert(dst, at);
            }
            None => {
                self.expires.remove(&dst[..]);
            }
        }
        true
    }

    /// Attach a deadline to an existing key. Fails on a missing key; the
    /// caller still has to arrange a sweeper wake-up.
    pub fn set_expire(&mut self, key: Bytes, at: DateTime<Utc>) -> bool {
        if !self.dict.contains_key(&key[..]) {
            return false;
        }
        self.expires.insert(key, at);
        true
    }

    pub fn remove_expire(&mut self, key: &[u8]) -> bool {
        self.expires.remove(key).is_some()
    }

    pub fn expire_at(&self, key: &[u8]) -> Option<DateTime<Utc>> {
        self.expires.get(key).copied()
    }

    /// One successful write = one increment, no matter how many sub-keys
    /// the command touched. After bumping, the save point whose change
    /// threshold equals the new count fires (smallest delay wins when
    /// several thresholds collide).
    pub fn signal_modified(&mut self) {
        self.dirty += 1;
        let Some(hook) = &self.on_save_point else {
            return;
        };
        let delay = self
            .save_params
            .iter()
            .filter(|p| p.changes == self.dirty)
            .map(|p| p.seconds)
            .min();
        if let Some(seconds) = delay {
            debug!(db = self.id, changes = self.dirty, delay = seconds, "save point reached");
            hook(Duration::from_secs(seconds));
        }
    }

    pub fn dirty(&self) -> u64 {
        self.dirty
    }

    pub fn reset_dirty(&mut self) {
        self.dirty = 0;
    }

    /// Drop every entry whose deadline has passed (value and expiration
    /// both) and report the earliest deadline still outstanding.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> (usize, Option<DateTime<Utc>>) {
        let expired: Vec<Bytes> = self
            .expires
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.dict.remove(&key[..]);
            self.expires.remove(&key[..]);
        }
        (expired.len(), self.expires.values().min().copied())
    }

    pub fn keys_matching(&self, pattern: &Pattern) -> Vec<Bytes> {
        self.dict.keys().filter(|k| pattern.matches(k)).cloned().collect()
    }

    pub fn random_key(&self) -> Option<Bytes> {
        self.dict.keys().choose(&mut rand::thread_rng()).cloned()
    }

    pub fn flush(&mut self) {
        self.dict.clear();
        self.expires.clear();
    }
}

struct SweepRequest {
    index: usize,
    deadline: DateTime<Utc>,
}

/// The fixed array of 16 databases behind a single reader/writer lock.
/// Read-dominant commands take the read half, every mutator the write
/// half; the lock is never held across a socket write.
pub struct Databases {
    dbs: RwLock<Vec<RedisDB>>,
    sweep_tx: mpsc::UnboundedSender<SweepRequest>,
}

impl Databases {
    /// Wrap the databases and start their expiration sweeper. The sweeper
    /// holds only a weak handle so dropping the set shuts it down.
    pub fn new(dbs: Vec<RedisDB>) -> Arc<Databases> {
        debug_assert_eq!(dbs.len(), DEFAULT_DBNUM);
        let (sweep_tx, sweep_rx) = mpsc::unbounded_channel();
        let databases = Arc::new(Databases { dbs: RwLock::new(dbs), sweep_tx });
        tokio::spawn(sweeper(Arc::downgrade(&databases), sweep_rx));
        databases
    }

    pub fn dbnum(&self) -> usize {
        DEFAULT_DBNUM
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Vec<RedisDB>> {
        self.dbs.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Vec<RedisDB>> {
        self.dbs.write().await
    }

    /// Ask the sweeper for a wake-up no later than `deadline`. Safe to
    /// call while holding the database lock: it is a plain channel send.
    pub fn schedule_expiration(&self, index: usize, deadline: DateTime<Utc>) {
        let _ = self.sweep_tx.send(SweepRequest { index, deadline });
    }

    /// SWAPDB: exchange two databases atomically under the write lock.
    /// Swapping a database with itself succeeds and changes nothing.
    pub async fn swap(&self, i: usize, j: usize) {
        if i == j {
            return;
        }
        let (next_i, next_j) = {
            let mut dbs = self.write().await;
            dbs.swap(i, j);
            // ids name the slot, not the payload
            dbs[i].id = i;
            dbs[j].id = j;
            (
                dbs[i].expires.values().min().copied(),
                dbs[j].expires.values().min().copied(),
            )
        };
        // the slots' pending wake-ups no longer match their contents
        if let Some(at) = next_i {
            self.schedule_expiration(i, at);
        }
        if let Some(at) = next_j {
            self.schedule_expiration(j, at);
        }
    }
}

fn quantize(at: DateTime<Utc>) -> DateTime<Utc> {
    let ms = at.timestamp_millis();
    let tick = (ms + SWEEP_TICK_MS - 1).div_euclid(SWEEP_TICK_MS) * SWEEP_TICK_MS;
    DateTime::from_timestamp_millis(tick).unwrap_or(at)
}

async fn sleep_until(at: Option<DateTime<Utc>>) {
    let Some(at) = at else {
        return std::future::pending::<()>().await;
    };
    let delta = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(delta).await
}

/// One task per database set owns the per-slot wake-up schedule. A new
/// request only replaces a pending tick when it is earlier; on wake it
/// sweeps every due slot under the write lock and rearms from what is
/// left in each expiration map.
async fn sweeper(databases: Weak<Databases>, mut rx: mpsc::UnboundedReceiver<SweepRequest>) {
    let mut pending: Vec<Option<DateTime<Utc>>> = vec![None; DEFAULT_DBNUM];
    loop {
        let earliest = pending.iter().flatten().min().copied();
        tokio::select! {
            request = rx.recv() => {
                let Some(SweepRequest { index, deadline }) = request else {
                    return;
                };
                if index >= pending.len() {
                    continue;
                }
                let tick = quantize(deadline);
                match pending[index] {
                    Some(current) if current <= tick => {}
                    _ => pending[index] = Some(tick),
                }
            }
            _ = sleep_until(earliest), if earliest.is_some() => {
                let Some(databases) = databases.upgrade() else {
                    return;
                };
                let now = Utc::now();
                let mut dbs = databases.write().await;
                for index in 0..pending.len() {
                    if !matches!(pending[index], Some(at) if at <= now) {
                        continue;
                    }
                    let (removed, next) = dbs[index].sweep_expired(now);
                    if removed > 0 {
                        debug!(db = index, removed, "swept expired keys");
                    }
                    pending[index] = next.map(quantize);
                }
            }
        }
    }
}
