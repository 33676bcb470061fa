use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::client::{serve_connection, ClientHandle};
use crate::cmd::CommandTable;
use crate::config::RedisConfig;
use crate::db::Databases;
use crate::pubsub::PubSub;
use crate::rdb::{self, SnapshotManager};
use crate::resp::RespValue;
use crate::util::{quote_bytes, timestamp};

pub static REDIS_VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Redis Server state: the database set, the snapshot manager, the
/// pub/sub bus and the registry of connected clients.
///

pub struct RedisServer {
    config: RedisConfig,
    pub dbs: Arc<Databases>,
    pub snapshots: SnapshotManager,
    pub pubsub: PubSub,
    clients: StdMutex<HashMap<u64, Arc<ClientHandle>>>,
    next_client_id: AtomicU64,
    monitors: AtomicUsize,
    stat_starttime: DateTime<Utc>,
    pub stat_numcommands: AtomicU64,    // number of processed commands
    pub stat_numconnections: AtomicU64, // number of connections received
    pid: u32,
}

impl RedisServer {
    /// Build the whole core: load the dump (when present), wire the
    /// save-point hook into every database, start the snapshot stream
    /// and arrange a prompt sweep of any loaded expirations.
    pub async fn new(config: RedisConfig) -> Arc<RedisServer> {
        let snapshots = SnapshotManager::new(config.db_filename.clone());
        let save_params = Arc::new(config.save_points.clone());
        let hook = snapshots.save_point_hook();

        let started = std::time::Instant::now();
        let dumps = rdb::load_dump(&config.db_filename);
        let loaded = !dumps.is_empty();
        let dbs = Databases::new(rdb::restore_databases(dumps, save_params, Some(hook)));
        snapshots.start(&dbs);
        if loaded {
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "DB loaded from disk");
        }

        // keys that expired while the server was down go away on the
        // first tick instead of lingering until their next write
        let now = Utc::now();
        {
            let loaded_dbs = dbs.read().await;
            for (index, db) in loaded_dbs.iter().enumerate() {
                if !db.expires().is_empty() {
                    dbs.schedule_expiration(index, now);
                }
            }
        }

        Arc::new(RedisServer {
            config,
            dbs,
            snapshots,
            pubsub: PubSub::new(),
            clients: StdMutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(0),
            monitors: AtomicUsize::new(0),
            stat_starttime: Utc::now(),
            stat_numcommands: AtomicU64::new(0),
            stat_numconnections: AtomicU64::new(0),
            pid: std::process::id(),
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn commands(&self) -> &Arc<CommandTable> {
        &self.config.commands
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.stat_starttime
    }

    /// Bind the listen socket. Without an explicit host this binds every
    /// interface, preferring the dual-stack wildcard and falling back to
    /// plain IPv4 where IPv6 is unavailable.
    pub async fn listen(&self) -> io::Result<TcpListener> {
        let port = self.config.port;
        match self.config.host.as_deref() {
            Some(host) => TcpListener::bind((host, port)).await,
            None => match TcpListener::bind(("::", port)).await {
                Ok(listener) => Ok(listener),
                Err(_) => TcpListener::bind(("0.0.0.0", port)).await,
            },
        }
    }

    /// Accept loop: one connection task per socket, pinned to the
    /// runtime's workers for its lifetime.
    pub async fn run(self: &Arc<Self>, listener: TcpListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        let banner = format!(
            "redi-rs {} listening on {} (pid {})",
            REDIS_VERSION, addr, self.pid
        );
        info!("{banner}");
        if self.config.always_show_log {
            eprintln!("{banner}");
        }
        loop {
            let (socket, peer) = listener.accept().await?;
            self.stat_numconnections.fetch_add(1, Ordering::Relaxed);
            let server = self.clone();
            tokio::spawn(serve_connection(server, socket, peer));
        }
    }

    pub(crate) fn register_client(
        &self,
        addr: SocketAddr,
        sender: tokio::sync::mpsc::UnboundedSender<RespValue>,
    ) -> Arc<ClientHandle> {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = Arc::new(ClientHandle::new(id, addr, sender));
        self.clients.lock().unwrap().insert(id, handle.clone());
        handle
    }

    /// Disconnect cleanup: the registry entry goes first, then the
    /// client's subscriptions and its monitor slot.
    pub(crate) fn unregister_client(&self, client: &ClientHandle) {
        self.clients.lock().unwrap().remove(&client.id());
        self.pubsub.remove_client(client.id());
        if client.is_monitoring() {
            self.monitors.fetch_sub(1, Ordering::Relaxed);
        }
        debug!(client = client.id(), "client disconnected");
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Registry snapshot ordered by client id (CLIENT LIST).
    pub fn client_handles(&self) -> Vec<Arc<ClientHandle>> {
        let mut handles: Vec<Arc<ClientHandle>> =
            self.clients.lock().unwrap().values().cloned().collect();
        handles.sort_by_key(|h| h.id());
        handles
    }

    pub(crate) fn add_monitor(&self) {
        self.monitors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.load(Ordering::Relaxed)
    }

    /// Echo a parsed command to every monitoring connection except the
    /// one that issued it: wall-clock seconds with six fractional
    /// digits, database index, peer address, then the quoted call array.
    pub(crate) fn feed_monitors(&self, db_index: usize, addr: SocketAddr, argv: &[Bytes], from: u64) {
        if self.monitor_count() == 0 {
            return;
        }
        let now = timestamp();
        let mut line = format!("{}.{:06} [{} {}]", now.as_secs(), now.subsec_micros(), db_index, addr);
        for arg in argv {
            line.push(' ');
            line.push_str(&quote_bytes(arg));
        }
        let frame = RespValue::SimpleString(Bytes::from(line));
        let clients = self.clients.lock().unwrap();
        for handle in clients.values() {
            if handle.is_monitoring() && handle.id() != from {
                handle.push(frame.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:34567".parse().unwrap()
    }

    #[tokio::test]
    async fn registry_assigns_monotonic_ids_and_cleans_up() {
        let server = RedisServer::new(RedisConfig::default()).await;
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let first = server.register_client(test_addr(), tx.clone());
        let second = server.register_client(test_addr(), tx);
        assert!(second.id() > first.id());
        assert_eq!(server.connected_clients(), 2);

        server.unregister_client(&first);
        assert_eq!(server.connected_clients(), 1);
        let remaining = server.client_handles();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), second.id());
    }

    #[tokio::test]
    async fn monitor_feed_skips_the_issuer() {
        let server = RedisServer::new(RedisConfig::default()).await;
        let (monitor_tx, mut monitor_rx) = tokio::sync::mpsc::unbounded_channel();
        let (other_tx, _other_rx) = tokio::sync::mpsc::unbounded_channel();
        let monitor = server.register_client(test_addr(), monitor_tx);
        let other = server.register_client(test_addr(), other_tx);
        monitor.set_monitoring(true);
        server.add_monitor();

        let argv = vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k\x01")];
        server.feed_monitors(2, other.addr(), &argv, other.id());

        let frame = monitor_rx.try_recv().expect("monitor line");
        let RespValue::SimpleString(line) = frame else {
            panic!("expected simple string");
        };
        let line = String::from_utf8_lossy(&line);
        assert!(line.contains("[2 "), "db index in {line}");
        assert!(line.contains("\"GET\" \"k\\x01\""), "quoted argv in {line}");

        // the issuing connection itself stays silent
        server.feed_monitors(0, monitor.addr(), &argv, monitor.id());
        assert!(monitor_rx.try_recv().is_err());
    }
}
