use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::cmd::{self, CommandContext, CommandError};
use crate::resp::{RespCodec, RespValue};
use crate::server::RedisServer;

///
/// Per-connection state and the frame loop.
///
/// Every accepted socket gets a reader task (this module's loop) and a
/// writer task draining an unbounded queue. All outbound traffic —
/// command replies, pub/sub deliveries, monitor lines — goes through
/// that queue, so per-connection ordering holds and no database lock is
/// ever held across a socket write.
///

/// Commands still accepted while the connection sits in SUBSCRIBE state.
static SUBSCRIBE_MODE_COMMANDS: [&str; 7] = [
    "SUBSCRIBE",
    "UNSUBSCRIBE",
    "PSUBSCRIBE",
    "PUNSUBSCRIBE",
    "PING",
    "QUIT",
    "PUBSUB",
];

/// With multiplexing we need per-client state; this is the piece other
/// tasks may look at (registry listing, monitor fan-out, pub/sub
/// delivery), so its fields are individually synchronized.
pub struct ClientHandle {
    id: u64,
    addr: SocketAddr,
    created_at: DateTime<Utc>,
    last_interaction: StdMutex<DateTime<Utc>>,
    last_cmd: StdMutex<&'static str>,
    name: StdMutex<Option<Bytes>>,
    db_index: AtomicUsize,
    monitoring: AtomicBool,
    channel_subs: AtomicUsize,
    pattern_subs: AtomicUsize,
    sender: mpsc::UnboundedSender<RespValue>,
}

impl ClientHandle {
    pub(crate) fn new(id: u64, addr: SocketAddr, sender: mpsc::UnboundedSender<RespValue>) -> ClientHandle {
        let now = Utc::now();
        ClientHandle {
            id,
            addr,
            created_at: now,
            last_interaction: StdMutex::new(now),
            last_cmd: StdMutex::new(""),
            name: StdMutex::new(None),
            db_index: AtomicUsize::new(0),
            monitoring: AtomicBool::new(false),
            channel_subs: AtomicUsize::new(0),
            pattern_subs: AtomicUsize::new(0),
            sender,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn db_index(&self) -> usize {
        self.db_index.load(Ordering::Relaxed)
    }

    pub fn set_db_index(&self, index: usize) {
        self.db_index.store(index, Ordering::Relaxed);
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Relaxed)
    }

    pub fn set_monitoring(&self, on: bool) {
        self.monitoring.store(on, Ordering::Relaxed);
    }

    pub fn name(&self) -> Option<Bytes> {
        self.name.lock().unwrap().clone()
    }

    pub fn set_name(&self, name: Option<Bytes>) {
        *self.name.lock().unwrap() = name;
    }

    pub fn set_subscriptions(&self, channels: usize, patterns: usize) {
        self.channel_subs.store(channels, Ordering::Relaxed);
        self.pattern_subs.store(patterns, Ordering::Relaxed);
    }

    /// Queue one frame for the writer task; a send onto a closed queue
    /// means the connection is going away and the frame is dropped.
    pub fn push(&self, value: RespValue) {
        let _ = self.sender.send(value);
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<RespValue> {
        self.sender.clone()
    }

    fn touch(&self, command: &'static str) {
        *self.last_interaction.lock().unwrap() = Utc::now();
        *self.last_cmd.lock().unwrap() = command;
    }

    /// One CLIENT LIST line.
    pub fn info_line(&self) -> String {
        let now = Utc::now();
        let age = (now - self.created_at).num_seconds().max(0);
        let idle = (now - *self.last_interaction.lock().unwrap()).num_seconds().max(0);
        let name = self
            .name()
            .map(|n| String::from_utf8_lossy(&n).into_owned())
            .unwrap_or_default();
        format!(
            "id={} addr={} name={} age={} idle={} db={} sub={} psub={} monitor={} cmd={}",
            self.id,
            self.addr,
            name,
            age,
            idle,
            self.db_index(),
            self.channel_subs.load(Ordering::Relaxed),
            self.pattern_subs.load(Ordering::Relaxed),
            self.is_monitoring() as u8,
            self.last_cmd.lock().unwrap().to_ascii_lowercase(),
        )
    }
}

/// Drive one client connection until it quits, disconnects or breaks
/// the protocol.
pub async fn serve_connection(server: Arc<RedisServer>, socket: TcpStream, addr: SocketAddr) {
    if let Err(err) = socket.set_nodelay(true) {
        debug!(%addr, %err, "TCP_NODELAY failed");
    }
    let framed = Framed::new(socket, RespCodec::new());
    let (sink, mut stream) = framed.split();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(write_replies(sink, rx));

    let client = server.register_client(addr, tx);
    debug!(client = client.id(), %addr, "client connected");

    let mut ctx = CommandContext::new(server.clone(), client.clone());
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(value) => {
                if !process_frame(&mut ctx, value).await {
                    break;
                }
            }
            Err(err) => {
                // framing errors are fatal for the connection
                warn!(client = client.id(), %err, "protocol error, closing connection");
                ctx.push(RespValue::error("ERR", format!("Protocol error: {err}")));
                break;
            }
        }
    }
    server.unregister_client(&client);
}

async fn write_replies(
    mut sink: SplitSink<Framed<TcpStream, RespCodec>, RespValue>,
    mut rx: mpsc::UnboundedReceiver<RespValue>,
) {
    while let Some(value) = rx.recv().await {
        if sink.send(value).await.is_err() {
            return;
        }
    }
    let _ = sink.close().await;
}

/// One frame through the pipeline: validate the call array, fan out to
/// monitors, look the command up, check arity and subscribe-state
/// admission, run the handler and queue the reply. Returns false when
/// the connection should close.
async fn process_frame(ctx: &mut CommandContext, frame: RespValue) -> bool {
    let items = match frame {
        RespValue::Array(Some(items)) => items,
        _ => {
            ctx.push(RespValue::error("ERR", "Protocol error: expected a call array"));
            return false;
        }
    };
    // an empty line in inline mode parses as an empty call; skip it
    if items.is_empty() {
        return true;
    }
    let mut argv: Vec<Bytes> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            RespValue::BulkString(Some(arg)) => argv.push(arg),
            _ => {
                ctx.push(RespValue::error("ERR", "Protocol error: call array must hold bulk strings"));
                return false;
            }
        }
    }

    // every parsed call reaches the monitors, even ones that fail the
    // lookup or arity checks below; unparsed traffic never gets here
    ctx.server.feed_monitors(ctx.db_index(), ctx.client.addr(), &argv, ctx.client.id());

    let Some(command) = ctx.server.commands().lookup(&argv[0]) else {
        let name = String::from_utf8_lossy(&argv[0]).to_lowercase();
        ctx.push(CommandError::UnknownCommand(name).to_resp());
        return true;
    };
    if !command.arity.accepts(argv.len()) {
        ctx.push(CommandError::WrongArity(command.name.to_ascii_lowercase()).to_resp());
        return true;
    }
    ctx.client.touch(command.name);

    if ctx.subscription_count() > 0 && !SUBSCRIBE_MODE_COMMANDS.contains(&command.name) {
        ctx.push(RespValue::error(
            "ERR",
            format!(
                "only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT / PUBSUB allowed in this context: {}",
                command.name.to_ascii_lowercase()
            ),
        ));
        return true;
    }

    let result = cmd::dispatch(&command, &argv, ctx).await;
    ctx.server
        .stat_numcommands
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    match result {
        Ok(Some(reply)) => ctx.push(reply),
        Ok(None) => {}
        Err(err) => ctx.push(err.to_resp()),
    }
    !ctx.quit
}
