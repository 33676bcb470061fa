use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::db::{Databases, RedisDB, SaveParam, SavePointHook, DEFAULT_DBNUM};
use crate::obj::{decode_b64, encode_b64, DumpObject};

///
/// Snapshot persistence: the JSON dump file and its save-point scheduler.
///
/// All save attempts funnel through one worker task, so two saves can
/// never overlap and the last-save bookkeeping has a single writer. The
/// dump replaces the previous file atomically (write to a temp sibling,
/// then rename).
///

/// One database in the dump: keyspace and expirations, keys base64-coded
/// so arbitrary bytes survive the trip through JSON. Expirations are
/// fractional epoch seconds.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DumpDatabase {
    pub keys: BTreeMap<String, DumpObject>,
    pub expirations: BTreeMap<String, f64>,
}

pub fn dump_database(db: &RedisDB) -> DumpDatabase {
    let keys = db
        .dict()
        .iter()
        .map(|(key, obj)| (encode_b64(key), DumpObject::from_obj(obj)))
        .collect();
    let expirations = db
        .expires()
        .iter()
        .map(|(key, at)| (encode_b64(key), at.timestamp_millis() as f64 / 1000.0))
        .collect();
    DumpDatabase { keys, expirations }
}

fn restore_database(
    dump: DumpDatabase,
    id: usize,
    save_params: Arc<Vec<SaveParam>>,
    on_save_point: Option<SavePointHook>,
) -> Result<RedisDB, base64::DecodeError> {
    let mut db = RedisDB::new(id, save_params, on_save_point);
    for (key, obj) in dump.keys {
        db.insert(decode_b64(&key)?, obj.into_obj()?);
    }
    for (key, seconds) in dump.expirations {
        let key = decode_b64(&key)?;
        let Some(at) = DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64) else {
            continue;
        };
        // an expiration without its key is dropped on the floor
        db.set_expire(key, at);
    }
    Ok(db)
}

/// Read the dump. A missing file, a file under two bytes, or one that
/// fails to decode all yield an empty dump (logged, never fatal).
pub fn load_dump(path: &Path) -> Vec<DumpDatabase> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(_) => return Vec::new(),
    };
    if data.len() < 2 {
        return Vec::new();
    }
    match serde_json::from_slice(&data) {
        Ok(dump) => dump,
        Err(err) => {
            warn!(path = %path.display(), %err, "corrupt dump file, starting with an empty dataset");
            Vec::new()
        }
    }
}

/// Turn dump records into live databases, padding with empty ones up to
/// the fixed count of 16. A database that fails to decode is replaced by
/// an empty one rather than aborting startup.
pub fn restore_databases(
    dumps: Vec<DumpDatabase>,
    save_params: Arc<Vec<SaveParam>>,
    on_save_point: Option<SavePointHook>,
) -> Vec<RedisDB> {
    let mut dbs = Vec::with_capacity(DEFAULT_DBNUM);
    for (id, dump) in dumps.into_iter().take(DEFAULT_DBNUM).enumerate() {
        match restore_database(dump, id, save_params.clone(), on_save_point.clone()) {
            Ok(db) => dbs.push(db),
            Err(err) => {
                warn!(db = id, %err, "corrupt database in dump, starting it empty");
                dbs.push(RedisDB::new(id, save_params.clone(), on_save_point.clone()));
            }
        }
    }
    while dbs.len() < DEFAULT_DBNUM {
        let id = dbs.len();
        dbs.push(RedisDB::new(id, save_params.clone(), on_save_point.clone()));
    }
    dbs
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("dump serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("snapshot worker is gone")]
    WorkerGone,
}

#[derive(Debug, Clone)]
pub struct SaveStats {
    pub last_save: DateTime<Utc>,
    pub last_save_duration: Duration,
}

enum Job {
    Save { ack: Option<oneshot::Sender<Result<(), SnapshotError>>> },
    ScheduleSave { delay: Duration },
}

pub struct SnapshotManager {
    tx: mpsc::UnboundedSender<Job>,
    rx: StdMutex<Option<mpsc::UnboundedReceiver<Job>>>,
    stats: Arc<StdMutex<SaveStats>>,
    path: PathBuf,
}

impl SnapshotManager {
    /// Two-phase construction: the manager exists first so its save-point
    /// hook can be wired into the databases, then `start` attaches the
    /// worker to the finished set.
    pub fn new(path: impl Into<PathBuf>) -> SnapshotManager {
        let (tx, rx) = mpsc::unbounded_channel();
        SnapshotManager {
            tx,
            rx: StdMutex::new(Some(rx)),
            stats: Arc::new(StdMutex::new(SaveStats {
                last_save: Utc::now(),
                last_save_duration: Duration::ZERO,
            })),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The callback a database invokes when a save point matches. It only
    /// enqueues onto the work stream, so firing it under the write lock
    /// cannot deadlock.
    pub fn save_point_hook(&self) -> SavePointHook {
        let tx = self.tx.clone();
        Arc::new(move |delay: Duration| {
            let _ = tx.send(Job::ScheduleSave { delay });
        })
    }

    /// Spawn the single-threaded work stream. Call exactly once.
    pub fn start(&self, databases: &Arc<Databases>) {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("snapshot manager started twice");
        tokio::spawn(snapshot_worker(
            self.path.clone(),
            Arc::downgrade(databases),
            self.stats.clone(),
            rx,
        ));
    }

    /// SAVE: wait for the worker to finish a full dump.
    pub async fn save(&self) -> Result<(), SnapshotError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Job::Save { ack: Some(ack) })
            .map_err(|_| SnapshotError::WorkerGone)?;
        done.await.map_err(|_| SnapshotError::WorkerGone)?
    }

    /// BGSAVE: enqueue and return immediately.
    pub fn background_save(&self) -> Result<(), SnapshotError> {
        self.tx
            .send(Job::Save { ack: None })
            .map_err(|_| SnapshotError::WorkerGone)
    }

    /// Arrange a save `delay` from now, keeping whichever pending
    /// deadline is earlier.
    pub fn schedule_save(&self, delay: Duration) {
        let _ = self.tx.send(Job::ScheduleSave { delay });
    }

    pub fn save_stats(&self) -> SaveStats {
        self.stats.lock().unwrap().clone()
    }
}

async fn snapshot_worker(
    path: PathBuf,
    databases: Weak<Databases>,
    stats: Arc<StdMutex<SaveStats>>,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    let mut scheduled: Option<tokio::time::Instant> = None;
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                None => return,
                Some(Job::Save { ack }) => {
                    let result = save_databases(&path, &databases, &stats).await;
                    if let Err(err) = &result {
                        warn!(%err, "save failed");
                    }
                    if let Some(ack) = ack {
                        let _ = ack.send(result);
                    }
                }
                Some(Job::ScheduleSave { delay }) => {
                    let at = tokio::time::Instant::now() + delay;
                    scheduled = match scheduled {
                        Some(current) if current <= at => Some(current),
                        _ => {
                            debug!(delay_secs = delay.as_secs(), "save scheduled");
                            Some(at)
                        }
                    };
                }
            },
            _ = async { tokio::time::sleep_until(scheduled.unwrap()).await }, if scheduled.is_some() => {
                scheduled = None;
                if let Err(err) = save_databases(&path, &databases, &stats).await {
                    warn!(%err, "scheduled save failed");
                }
            }
        }
    }
}

/// Take a consistent copy of every database under the write lock, zero
/// the change counters, release the lock, then serialize and atomically
/// replace the dump file.
async fn save_databases(
    path: &Path,
    databases: &Weak<Databases>,
    stats: &Arc<StdMutex<SaveStats>>,
) -> Result<(), SnapshotError> {
    let Some(databases) = databases.upgrade() else {
        return Err(SnapshotError::WorkerGone);
    };
    let started = std::time::Instant::now();
    let dump: Vec<DumpDatabase> = {
        let mut dbs = databases.write().await;
        let dump = dbs.iter().map(dump_database).collect();
        for db in dbs.iter_mut() {
            db.reset_dirty();
        }
        dump
    };
    let json = serde_json::to_vec(&dump)?;

    let temp = path.with_file_name(format!("temp-{}.json", std::process::id()));
    tokio::fs::write(&temp, &json).await?;
    if let Err(err) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(err.into());
    }

    let elapsed = started.elapsed();
    {
        let mut stats = stats.lock().unwrap();
        stats.last_save = Utc::now();
        stats.last_save_duration = elapsed;
    }
    info!(path = %path.display(), bytes = json.len(), "DB saved on disk");
    Ok(())
}
