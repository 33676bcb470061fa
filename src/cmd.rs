use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::ops::BitOr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::client::ClientHandle;
use crate::db::RedisDB;
use crate::obj::RedisObject;
use crate::pattern::PatternError;
use crate::resp::RespValue;
use crate::server::RedisServer;
use crate::util::parse_i64;

pub mod expire;
pub mod hash;
pub mod keyspace;
pub mod list;
pub mod pubsub;
pub mod server;
pub mod set;
pub mod string;

///
/// Redis Commands: the static table, argument shapes and dispatch.
///

/// Errors a command can surface to the client. The connection layer
/// renders them as `-CODE message\r\n` and keeps the connection alive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("no such key")]
    NoSuchKey,
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("offset is out of range")]
    OffsetOutOfRange,
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    #[error("syntax error")]
    Syntax,
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("unknown subcommand '{0}'")]
    UnknownSubcommand(String),
    #[error("DB index is out of range")]
    DbIndexOutOfRange,
    #[error("unsupported pattern '{0}'")]
    PatternNotImplemented(String),
    /// operational failure surfaced to the client (snapshot I/O and kin)
    #[error("{0}")]
    Failed(String),
    #[error("{0}")]
    Internal(String),
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::WrongType => "WRONGTYPE",
            CommandError::PatternNotImplemented(_) | CommandError::Internal(_) => "500",
            _ => "ERR",
        }
    }

    pub fn to_resp(&self) -> RespValue {
        RespValue::error(self.code(), self.to_string())
    }
}

impl From<PatternError> for CommandError {
    fn from(err: PatternError) -> CommandError {
        CommandError::PatternNotImplemented(err.0)
    }
}

/// Per-invocation context handed to every handler: the server, this
/// connection's registry entry, and the connection-local subscription
/// bookkeeping that drives the SUBSCRIBE state machine.
pub struct CommandContext {
    pub server: Arc<RedisServer>,
    pub client: Arc<ClientHandle>,
    pub channels: HashSet<Bytes>,
    pub patterns: HashSet<Bytes>,
    pub quit: bool,
}

impl CommandContext {
    pub fn new(server: Arc<RedisServer>, client: Arc<ClientHandle>) -> CommandContext {
        CommandContext {
            server,
            client,
            channels: HashSet::new(),
            patterns: HashSet::new(),
            quit: false,
        }
    }

    pub fn db_index(&self) -> usize {
        self.client.db_index()
    }

    pub fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    /// Queue a frame on this connection's outbound stream, bypassing the
    /// single-reply return path (subscribe confirmations come in batches).
    pub fn push(&self, value: RespValue) {
        self.client.push(value);
    }
}

/// `Ok(None)` means the handler already queued whatever had to go out.
pub type CmdResult = Result<Option<RespValue>, CommandError>;
pub type CmdFuture<'a> = Pin<Box<dyn Future<Output = CmdResult> + Send + 'a>>;

type NoArgsProc = for<'a> fn(&'a mut CommandContext) -> CmdFuture<'a>;
type OptionalValueProc = for<'a> fn(Option<Bytes>, &'a mut CommandContext) -> CmdFuture<'a>;
type ValueProc = for<'a> fn(Bytes, &'a mut CommandContext) -> CmdFuture<'a>;
type ValueValueProc = for<'a> fn(Bytes, Bytes, &'a mut CommandContext) -> CmdFuture<'a>;
type ValueValueValueProc = for<'a> fn(Bytes, Bytes, Bytes, &'a mut CommandContext) -> CmdFuture<'a>;
type ValuesProc = for<'a> fn(Vec<Bytes>, &'a mut CommandContext) -> CmdFuture<'a>;
type ValueValuesProc = for<'a> fn(Bytes, Vec<Bytes>, &'a mut CommandContext) -> CmdFuture<'a>;
type KeyValueOptionsProc =
    for<'a> fn(Bytes, Bytes, Vec<Bytes>, &'a mut CommandContext) -> CmdFuture<'a>;
type KeyRangeProc = for<'a> fn(Bytes, i64, i64, &'a mut CommandContext) -> CmdFuture<'a>;
type KeyIndexProc = for<'a> fn(Bytes, i64, &'a mut CommandContext) -> CmdFuture<'a>;
type KeyIndexValueProc = for<'a> fn(Bytes, i64, Bytes, &'a mut CommandContext) -> CmdFuture<'a>;
type PairsProc = for<'a> fn(Vec<(Bytes, Bytes)>, &'a mut CommandContext) -> CmdFuture<'a>;

/// The closed set of call signatures a command can demand after wire
/// validation. Dispatch is a match over the tag; each variant carries a
/// function with exactly the arity it names.
pub enum CommandProc {
    NoArgs(NoArgsProc),
    OptionalValue(OptionalValueProc),
    SingleValue(ValueProc),
    ValueValue(ValueValueProc),
    OneOrMoreValues(ValuesProc),
    Key(ValueProc),
    KeyKey(ValueValueProc),
    KeyValue(ValueValueProc),
    KeyValueValue(ValueValueValueProc),
    KeyValueOptions(KeyValueOptionsProc),
    KeyValues(ValueValuesProc),
    KeyRange(KeyRangeProc),
    KeyIndex(KeyIndexProc),
    KeyIndexValue(KeyIndexValueProc),
    Keys(ValuesProc),
    KeyValueMap(PairsProc),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fix(usize),
    Minimum(usize),
}

impl Arity {
    /// `argc` includes the command name itself.
    pub fn accepts(&self, argc: usize) -> bool {
        match *self {
            Arity::Fix(n) => argc == n + 1,
            Arity::Minimum(n) => argc > n,
        }
    }

    /// The classic wire encoding COMMAND reports: `n+1` when fixed,
    /// `-(n+1)` for minimum-of-n.
    pub fn encode(&self) -> i64 {
        match *self {
            Arity::Fix(n) => n as i64 + 1,
            Arity::Minimum(n) => -(n as i64 + 1),
        }
    }
}

/// Command flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdFlags(u16);

impl CmdFlags {
    pub fn none() -> CmdFlags {
        CmdFlags(0)
    }
    pub fn write() -> CmdFlags {
        CmdFlags(1)
    }
    pub fn readonly() -> CmdFlags {
        CmdFlags(2)
    }
    /// Denied once the server crosses its memory ceiling; kept on every
    /// command that can enlarge the dataset.
    pub fn deny_oom() -> CmdFlags {
        CmdFlags(4)
    }
    pub fn admin() -> CmdFlags {
        CmdFlags(8)
    }
    pub fn pubsub() -> CmdFlags {
        CmdFlags(16)
    }
    pub fn noscript() -> CmdFlags {
        CmdFlags(32)
    }
    pub fn random() -> CmdFlags {
        CmdFlags(64)
    }
    pub fn loading() -> CmdFlags {
        CmdFlags(128)
    }
    pub fn stale() -> CmdFlags {
        CmdFlags(256)
    }
    pub fn fast() -> CmdFlags {
        CmdFlags(512)
    }
    pub fn sort_for_script() -> CmdFlags {
        CmdFlags(1024)
    }

    pub fn is_write(&self) -> bool {
        self.0 & Self::write().0 != 0
    }
    pub fn is_readonly(&self) -> bool {
        self.0 & Self::readonly().0 != 0
    }

    /// Flag names in the order COMMAND reports them.
    pub fn names(&self) -> Vec<&'static str> {
        let all = [
            (Self::write(), "write"),
            (Self::readonly(), "readonly"),
            (Self::deny_oom(), "denyoom"),
            (Self::admin(), "admin"),
            (Self::pubsub(), "pubsub"),
            (Self::noscript(), "noscript"),
            (Self::random(), "random"),
            (Self::loading(), "loading"),
            (Self::stale(), "stale"),
            (Self::fast(), "fast"),
            (Self::sort_for_script(), "sort_for_script"),
        ];
        all.iter().filter(|(flag, _)| self.0 & flag.0 != 0).map(|(_, name)| *name).collect()
    }
}

impl BitOr for CmdFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        CmdFlags(self.0 | rhs.0)
    }
}

pub struct RedisCommand {
    pub name: &'static str,
    pub proc: CommandProc,
    pub arity: Arity,
    pub flags: CmdFlags,
    /// The first argument that's a key (0 = no keys)
    pub firstkey: i32,
    /// The last argument that's a key (-1 = last argument)
    pub lastkey: i32,
    /// The step between first and last key
    pub keystep: i32,
}

/// The table keeps definition order for COMMAND output and an uppercase
/// index for the case-insensitive lookup.
pub struct CommandTable {
    list: Vec<Arc<RedisCommand>>,
    index: HashMap<&'static str, Arc<RedisCommand>>,
}

impl CommandTable {
    fn from_commands(list: Vec<Arc<RedisCommand>>) -> CommandTable {
        let index = list.iter().map(|cmd| (cmd.name, cmd.clone())).collect();
        CommandTable { list, index }
    }

    pub fn lookup(&self, name: &[u8]) -> Option<Arc<RedisCommand>> {
        let folded = String::from_utf8_lossy(name).to_ascii_uppercase();
        self.index.get(folded.as_str()).cloned()
    }

    pub fn commands(&self) -> &[Arc<RedisCommand>] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// Run one validated invocation: peel the argument shape off the wire
/// values and call the typed handler. `argv[0]` is the command name and
/// arity has already been checked.
pub async fn dispatch(cmd: &RedisCommand, argv: &[Bytes], ctx: &mut CommandContext) -> CmdResult {
    match cmd.proc {
        CommandProc::NoArgs(f) => f(ctx).await,
        CommandProc::OptionalValue(f) => f(argv.get(1).cloned(), ctx).await,
        CommandProc::SingleValue(f) | CommandProc::Key(f) => f(argv[1].clone(), ctx).await,
        CommandProc::ValueValue(f) | CommandProc::KeyKey(f) | CommandProc::KeyValue(f) => {
            f(argv[1].clone(), argv[2].clone(), ctx).await
        }
        CommandProc::KeyValueValue(f) => {
            f(argv[1].clone(), argv[2].clone(), argv[3].clone(), ctx).await
        }
        CommandProc::KeyValueOptions(f) => {
            f(argv[1].clone(), argv[2].clone(), argv[3..].to_vec(), ctx).await
        }
        CommandProc::OneOrMoreValues(f) => f(argv[1..].to_vec(), ctx).await,
        CommandProc::KeyValues(f) => f(argv[1].clone(), argv[2..].to_vec(), ctx).await,
        CommandProc::KeyRange(f) => {
            f(argv[1].clone(), arg_int(&argv[2])?, arg_int(&argv[3])?, ctx).await
        }
        CommandProc::KeyIndex(f) => f(argv[1].clone(), arg_int(&argv[2])?, ctx).await,
        CommandProc::KeyIndexValue(f) => {
            f(argv[1].clone(), arg_int(&argv[2])?, argv[3].clone(), ctx).await
        }
        CommandProc::Keys(f) => f(extract_keys(cmd, argv), ctx).await,
        CommandProc::KeyValueMap(f) => {
            if (argv.len() - 1) % 2 != 0 {
                return Err(CommandError::WrongArity(cmd.name.to_ascii_lowercase()));
            }
            let pairs = argv[1..]
                .chunks_exact(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect();
            f(pairs, ctx).await
        }
    }
}

pub(crate) fn arg_int(bytes: &Bytes) -> Result<i64, CommandError> {
    parse_i64(bytes).ok_or(CommandError::NotAnInteger)
}

/// Pull the key arguments out of `argv` per the command's
/// `firstkey..lastkey by keystep` declaration.
fn extract_keys(cmd: &RedisCommand, argv: &[Bytes]) -> Vec<Bytes> {
    if cmd.firstkey <= 0 {
        return Vec::new();
    }
    let first = cmd.firstkey as usize;
    let last = if cmd.lastkey < 0 {
        (argv.len() as i64 + cmd.lastkey as i64).max(0) as usize
    } else {
        cmd.lastkey as usize
    };
    let step = cmd.keystep.max(1) as usize;
    (first..=last.min(argv.len().saturating_sub(1)))
        .step_by(step)
        .map(|i| argv[i].clone())
        .collect()
}

///
/// Typed keyspace access shared by the handlers. Reads return `Ok(None)`
/// on a missing key and WRONGTYPE when the key holds another kind.
///

pub(crate) fn read_string<'a>(db: &'a RedisDB, key: &[u8]) -> Result<Option<&'a Bytes>, CommandError> {
    match db.lookup(key) {
        None => Ok(None),
        Some(RedisObject::String(s)) => Ok(Some(s)),
        Some(_) => Err(CommandError::WrongType),
    }
}

pub(crate) fn read_list<'a>(
    db: &'a RedisDB,
    key: &[u8],
) -> Result<Option<&'a VecDeque<Bytes>>, CommandError> {
    match db.lookup(key) {
        None => Ok(None),
        Some(RedisObject::List(l)) => Ok(Some(l)),
        Some(_) => Err(CommandError::WrongType),
    }
}

pub(crate) fn read_set<'a>(
    db: &'a RedisDB,
    key: &[u8],
) -> Result<Option<&'a HashSet<Bytes>>, CommandError> {
    match db.lookup(key) {
        None => Ok(None),
        Some(RedisObject::Set(s)) => Ok(Some(s)),
        Some(_) => Err(CommandError::WrongType),
    }
}

pub(crate) fn read_hash<'a>(
    db: &'a RedisDB,
    key: &[u8],
) -> Result<Option<&'a HashMap<Bytes, Bytes>>, CommandError> {
    match db.lookup(key) {
        None => Ok(None),
        Some(RedisObject::Hash(h)) => Ok(Some(h)),
        Some(_) => Err(CommandError::WrongType),
    }
}

/// Mutable access; with `create` the key is materialized as an empty
/// container of the right kind.
pub(crate) fn list_mut<'a>(
    db: &'a mut RedisDB,
    key: &Bytes,
    create: bool,
) -> Result<Option<&'a mut VecDeque<Bytes>>, CommandError> {
    match db.lookup(key) {
        Some(RedisObject::List(_)) => {}
        Some(_) => return Err(CommandError::WrongType),
        None if !create => return Ok(None),
        None => {
            db.insert(key.clone(), RedisObject::List(VecDeque::new()));
        }
    }
    Ok(db.lookup_mut(key).and_then(RedisObject::list_mut))
}

pub(crate) fn set_mut<'a>(
    db: &'a mut RedisDB,
    key: &Bytes,
    create: bool,
) -> Result<Option<&'a mut HashSet<Bytes>>, CommandError> {
    match db.lookup(key) {
        Some(RedisObject::Set(_)) => {}
        Some(_) => return Err(CommandError::WrongType),
        None if !create => return Ok(None),
        None => {
            db.insert(key.clone(), RedisObject::Set(HashSet::new()));
        }
    }
    Ok(db.lookup_mut(key).and_then(RedisObject::set_mut))
}

pub(crate) fn hash_mut<'a>(
    db: &'a mut RedisDB,
    key: &Bytes,
    create: bool,
) -> Result<Option<&'a mut HashMap<Bytes, Bytes>>, CommandError> {
    match db.lookup(key) {
        Some(RedisObject::Hash(_)) => {}
        Some(_) => return Err(CommandError::WrongType),
        None if !create => return Ok(None),
        None => {
            db.insert(key.clone(), RedisObject::Hash(HashMap::new()));
        }
    }
    Ok(db.lookup_mut(key).and_then(RedisObject::hash_mut))
}

/// Command Table
pub static CMD_TABLE: Lazy<Arc<CommandTable>> = Lazy::new(|| Arc::new(default_table()));

/// Wrap a typed async handler as the fn-pointer form its shape variant
/// stores. A named fn item picks up the higher-ranked lifetime through
/// ordinary elision, which a closure would not.
macro_rules! shape {
    (NoArgs, $handler:path) => {{
        fn thunk(ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(ctx))
        }
        CommandProc::NoArgs(thunk)
    }};
    (OptionalValue, $handler:path) => {{
        fn thunk(value: Option<Bytes>, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(value, ctx))
        }
        CommandProc::OptionalValue(thunk)
    }};
    (SingleValue, $handler:path) => {{
        fn thunk(value: Bytes, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(value, ctx))
        }
        CommandProc::SingleValue(thunk)
    }};
    (ValueValue, $handler:path) => {{
        fn thunk(a: Bytes, b: Bytes, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(a, b, ctx))
        }
        CommandProc::ValueValue(thunk)
    }};
    (OneOrMoreValues, $handler:path) => {{
        fn thunk(values: Vec<Bytes>, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(values, ctx))
        }
        CommandProc::OneOrMoreValues(thunk)
    }};
    (Key, $handler:path) => {{
        fn thunk(key: Bytes, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(key, ctx))
        }
        CommandProc::Key(thunk)
    }};
    (KeyKey, $handler:path) => {{
        fn thunk(src: Bytes, dst: Bytes, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(src, dst, ctx))
        }
        CommandProc::KeyKey(thunk)
    }};
    (KeyValue, $handler:path) => {{
        fn thunk(key: Bytes, value: Bytes, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(key, value, ctx))
        }
        CommandProc::KeyValue(thunk)
    }};
    (KeyValueValue, $handler:path) => {{
        fn thunk(key: Bytes, a: Bytes, b: Bytes, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(key, a, b, ctx))
        }
        CommandProc::KeyValueValue(thunk)
    }};
    (KeyValueOptions, $handler:path) => {{
        fn thunk(key: Bytes, value: Bytes, options: Vec<Bytes>, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(key, value, options, ctx))
        }
        CommandProc::KeyValueOptions(thunk)
    }};
    (KeyValues, $handler:path) => {{
        fn thunk(key: Bytes, values: Vec<Bytes>, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(key, values, ctx))
        }
        CommandProc::KeyValues(thunk)
    }};
    (KeyRange, $handler:path) => {{
        fn thunk(key: Bytes, start: i64, stop: i64, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(key, start, stop, ctx))
        }
        CommandProc::KeyRange(thunk)
    }};
    (KeyIndex, $handler:path) => {{
        fn thunk(key: Bytes, index: i64, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(key, index, ctx))
        }
        CommandProc::KeyIndex(thunk)
    }};
    (KeyIndexValue, $handler:path) => {{
        fn thunk(key: Bytes, index: i64, value: Bytes, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(key, index, value, ctx))
        }
        CommandProc::KeyIndexValue(thunk)
    }};
    (Keys, $handler:path) => {{
        fn thunk(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(keys, ctx))
        }
        CommandProc::Keys(thunk)
    }};
    (KeyValueMap, $handler:path) => {{
        fn thunk(pairs: Vec<(Bytes, Bytes)>, ctx: &mut CommandContext) -> CmdFuture<'_> {
            Box::pin($handler(pairs, ctx))
        }
        CommandProc::KeyValueMap(thunk)
    }};
}

fn cmd(
    name: &'static str,
    proc: CommandProc,
    arity: Arity,
    flags: CmdFlags,
    firstkey: i32,
    lastkey: i32,
    keystep: i32,
) -> Arc<RedisCommand> {
    Arc::new(RedisCommand { name, proc, arity, flags, firstkey, lastkey, keystep })
}

fn default_table() -> CommandTable {
    use Arity::{Fix, Minimum};

    let w = CmdFlags::write;
    let r = CmdFlags::readonly;
    let dm = CmdFlags::deny_oom;
    let f = CmdFlags::fast;

    CommandTable::from_commands(vec![
        // keyspace
        cmd("KEYS", shape!(SingleValue, keyspace::keys_command), Fix(1), r() | CmdFlags::sort_for_script(), 0, 0, 0),
        cmd("EXISTS", shape!(Keys, keyspace::exists_command), Minimum(1), r() | f(), 1, -1, 1),
        cmd("DEL", shape!(Keys, keyspace::del_command), Minimum(1), w(), 1, -1, 1),
        cmd("TYPE", shape!(Key, keyspace::type_command), Fix(1), r() | f(), 1, 1, 1),
        cmd("RENAME", shape!(KeyKey, keyspace::rename_command), Fix(2), w(), 1, 2, 1),
        cmd("RENAMENX", shape!(KeyKey, keyspace::renamenx_command), Fix(2), w() | f(), 1, 2, 1),
        cmd("DBSIZE", shape!(NoArgs, keyspace::dbsize_command), Fix(0), r() | f(), 0, 0, 0),
        cmd("RANDOMKEY", shape!(NoArgs, keyspace::randomkey_command), Fix(0), r() | CmdFlags::random(), 0, 0, 0),
        cmd("FLUSHDB", shape!(NoArgs, keyspace::flushdb_command), Fix(0), w(), 0, 0, 0),
        cmd("FLUSHALL", shape!(NoArgs, keyspace::flushall_command), Fix(0), w(), 0, 0, 0),
        // expirations
        cmd("EXPIRE", shape!(KeyIndex, expire::expire_command), Fix(2), w() | f(), 1, 1, 1),
        cmd("PEXPIRE", shape!(KeyIndex, expire::pexpire_command), Fix(2), w() | f(), 1, 1, 1),
        cmd("EXPIREAT", shape!(KeyIndex, expire::expireat_command), Fix(2), w() | f(), 1, 1, 1),
        cmd("PEXPIREAT", shape!(KeyIndex, expire::pexpireat_command), Fix(2), w() | f(), 1, 1, 1),
        cmd("TTL", shape!(Key, expire::ttl_command), Fix(1), r() | f(), 1, 1, 1),
        cmd("PTTL", shape!(Key, expire::pttl_command), Fix(1), r() | f(), 1, 1, 1),
        cmd("PERSIST", shape!(Key, expire::persist_command), Fix(1), w() | f(), 1, 1, 1),
        // strings
        cmd("GET", shape!(Key, string::get_command), Fix(1), r() | f(), 1, 1, 1),
        cmd("SET", shape!(KeyValueOptions, string::set_command), Minimum(2), w() | dm(), 1, 1, 1),
        cmd("SETNX", shape!(KeyValue, string::setnx_command), Fix(2), w() | dm() | f(), 1, 1, 1),
        cmd("SETEX", shape!(KeyIndexValue, string::setex_command), Fix(3), w() | dm(), 1, 1, 1),
        cmd("PSETEX", shape!(KeyIndexValue, string::psetex_command), Fix(3), w() | dm(), 1, 1, 1),
        cmd("GETSET", shape!(KeyValue, string::getset_command), Fix(2), w() | dm(), 1, 1, 1),
        cmd("APPEND", shape!(KeyValue, string::append_command), Fix(2), w() | dm(), 1, 1, 1),
        cmd("STRLEN", shape!(Key, string::strlen_command), Fix(1), r() | f(), 1, 1, 1),
        cmd("GETRANGE", shape!(KeyRange, string::getrange_command), Fix(3), r(), 1, 1, 1),
        cmd("SUBSTR", shape!(KeyRange, string::getrange_command), Fix(3), r(), 1, 1, 1),
        cmd("SETRANGE", shape!(KeyIndexValue, string::setrange_command), Fix(3), w() | dm(), 1, 1, 1),
        cmd("MGET", shape!(Keys, string::mget_command), Minimum(1), r() | f(), 1, -1, 1),
        cmd("MSET", shape!(KeyValueMap, string::mset_command), Minimum(2), w() | dm(), 1, -1, 2),
        cmd("MSETNX", shape!(KeyValueMap, string::msetnx_command), Minimum(2), w() | dm(), 1, -1, 2),
        cmd("INCR", shape!(Key, string::incr_command), Fix(1), w() | dm() | f(), 1, 1, 1),
        cmd("DECR", shape!(Key, string::decr_command), Fix(1), w() | dm() | f(), 1, 1, 1),
        cmd("INCRBY", shape!(KeyIndex, string::incrby_command), Fix(2), w() | dm() | f(), 1, 1, 1),
        cmd("DECRBY", shape!(KeyIndex, string::decrby_command), Fix(2), w() | dm() | f(), 1, 1, 1),
        // lists
        cmd("LLEN", shape!(Key, list::llen_command), Fix(1), r() | f(), 1, 1, 1),
        cmd("LRANGE", shape!(KeyRange, list::lrange_command), Fix(3), r(), 1, 1, 1),
        cmd("LINDEX", shape!(KeyIndex, list::lindex_command), Fix(2), r(), 1, 1, 1),
        cmd("LSET", shape!(KeyIndexValue, list::lset_command), Fix(3), w() | dm(), 1, 1, 1),
        cmd("LPUSH", shape!(KeyValues, list::lpush_command), Minimum(2), w() | dm() | f(), 1, 1, 1),
        cmd("RPUSH", shape!(KeyValues, list::rpush_command), Minimum(2), w() | dm() | f(), 1, 1, 1),
        cmd("LPUSHX", shape!(KeyValues, list::lpushx_command), Minimum(2), w() | dm() | f(), 1, 1, 1),
        cmd("RPUSHX", shape!(KeyValues, list::rpushx_command), Minimum(2), w() | dm() | f(), 1, 1, 1),
        cmd("LPOP", shape!(Key, list::lpop_command), Fix(1), w() | f(), 1, 1, 1),
        cmd("RPOP", shape!(Key, list::rpop_command), Fix(1), w() | f(), 1, 1, 1),
        // hashes
        cmd("HLEN", shape!(Key, hash::hlen_command), Fix(1), r() | f(), 1, 1, 1),
        cmd("HGETALL", shape!(Key, hash::hgetall_command), Fix(1), r(), 1, 1, 1),
        cmd("HGET", shape!(KeyValue, hash::hget_command), Fix(2), r() | f(), 1, 1, 1),
        cmd("HEXISTS", shape!(KeyValue, hash::hexists_command), Fix(2), r() | f(), 1, 1, 1),
        cmd("HSTRLEN", shape!(KeyValue, hash::hstrlen_command), Fix(2), r() | f(), 1, 1, 1),
        cmd("HKEYS", shape!(Key, hash::hkeys_command), Fix(1), r() | CmdFlags::sort_for_script(), 1, 1, 1),
        cmd("HVALS", shape!(Key, hash::hvals_command), Fix(1), r() | CmdFlags::sort_for_script(), 1, 1, 1),
        cmd("HSET", shape!(KeyValueValue, hash::hset_command), Fix(3), w() | dm() | f(), 1, 1, 1),
        cmd("HSETNX", shape!(KeyValueValue, hash::hsetnx_command), Fix(3), w() | dm() | f(), 1, 1, 1),
        cmd("HINCRBY", shape!(KeyValueValue, hash::hincrby_command), Fix(3), w() | dm() | f(), 1, 1, 1),
        cmd("HMSET", shape!(KeyValues, hash::hmset_command), Minimum(3), w() | dm(), 1, 1, 1),
        cmd("HMGET", shape!(KeyValues, hash::hmget_command), Minimum(2), r() | f(), 1, 1, 1),
        cmd("HDEL", shape!(KeyValues, hash::hdel_command), Minimum(2), w() | f(), 1, 1, 1),
        // sets
        cmd("SCARD", shape!(Key, set::scard_command), Fix(1), r() | f(), 1, 1, 1),
        cmd("SMEMBERS", shape!(Key, set::smembers_command), Fix(1), r() | CmdFlags::sort_for_script(), 1, 1, 1),
        cmd("SISMEMBER", shape!(KeyValue, set::sismember_command), Fix(2), r() | f(), 1, 1, 1),
        cmd("SADD", shape!(KeyValues, set::sadd_command), Minimum(2), w() | dm() | f(), 1, 1, 1),
        cmd("SREM", shape!(KeyValues, set::srem_command), Minimum(2), w() | f(), 1, 1, 1),
        cmd("SDIFF", shape!(Keys, set::sdiff_command), Minimum(1), r() | CmdFlags::sort_for_script(), 1, -1, 1),
        cmd("SINTER", shape!(Keys, set::sinter_command), Minimum(1), r() | CmdFlags::sort_for_script(), 1, -1, 1),
        cmd("SUNION", shape!(Keys, set::sunion_command), Minimum(1), r() | CmdFlags::sort_for_script(), 1, -1, 1),
        cmd("SDIFFSTORE", shape!(Keys, set::sdiffstore_command), Minimum(2), w() | dm(), 1, -1, 1),
        cmd("SINTERSTORE", shape!(Keys, set::sinterstore_command), Minimum(2), w() | dm(), 1, -1, 1),
        cmd("SUNIONSTORE", shape!(Keys, set::sunionstore_command), Minimum(2), w() | dm(), 1, -1, 1),
        // pub/sub
        cmd("PUBLISH", shape!(ValueValue, pubsub::publish_command), Fix(2), CmdFlags::pubsub() | CmdFlags::loading() | CmdFlags::stale() | f(), 0, 0, 0),
        cmd("SUBSCRIBE", shape!(OneOrMoreValues, pubsub::subscribe_command), Minimum(1), CmdFlags::pubsub() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        cmd("UNSUBSCRIBE", shape!(OneOrMoreValues, pubsub::unsubscribe_command), Minimum(0), CmdFlags::pubsub() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        cmd("PSUBSCRIBE", shape!(OneOrMoreValues, pubsub::psubscribe_command), Minimum(1), CmdFlags::pubsub() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        cmd("PUNSUBSCRIBE", shape!(OneOrMoreValues, pubsub::punsubscribe_command), Minimum(0), CmdFlags::pubsub() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        cmd("PUBSUB", shape!(OneOrMoreValues, pubsub::pubsub_command), Minimum(1), CmdFlags::pubsub() | CmdFlags::random() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        // server
        cmd("PING", shape!(OptionalValue, server::ping_command), Minimum(0), CmdFlags::stale() | f(), 0, 0, 0),
        cmd("ECHO", shape!(SingleValue, server::echo_command), Fix(1), f(), 0, 0, 0),
        cmd("QUIT", shape!(NoArgs, server::quit_command), Fix(0), CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        cmd("SELECT", shape!(SingleValue, server::select_command), Fix(1), CmdFlags::loading() | f(), 0, 0, 0),
        cmd("SWAPDB", shape!(ValueValue, server::swapdb_command), Fix(2), w() | f(), 0, 0, 0),
        cmd("MONITOR", shape!(NoArgs, server::monitor_command), Fix(0), CmdFlags::admin() | CmdFlags::noscript() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        cmd("SAVE", shape!(NoArgs, server::save_command), Fix(0), CmdFlags::admin() | CmdFlags::noscript(), 0, 0, 0),
        cmd("BGSAVE", shape!(NoArgs, server::bgsave_command), Fix(0), CmdFlags::admin() | CmdFlags::noscript(), 0, 0, 0),
        cmd("LASTSAVE", shape!(NoArgs, server::lastsave_command), Fix(0), CmdFlags::random() | CmdFlags::loading() | CmdFlags::stale() | f(), 0, 0, 0),
        cmd("SHUTDOWN", shape!(OptionalValue, server::shutdown_command), Minimum(0), CmdFlags::admin() | CmdFlags::noscript() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        cmd("COMMAND", shape!(OptionalValue, server::command_command), Minimum(0), CmdFlags::random() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        cmd("CLIENT", shape!(OneOrMoreValues, server::client_command), Minimum(1), CmdFlags::admin() | CmdFlags::noscript() | CmdFlags::random() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
        cmd("INFO", shape!(OptionalValue, server::info_command), Minimum(0), CmdFlags::random() | CmdFlags::loading() | CmdFlags::stale(), 0, 0, 0),
    ])
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_accepts() {
        assert!(Arity::Fix(1).accepts(2));
        assert!(!Arity::Fix(1).accepts(3));
        assert!(Arity::Minimum(2).accepts(3));
        assert!(Arity::Minimum(2).accepts(9));
        assert!(!Arity::Minimum(2).accepts(2));
        assert!(Arity::Minimum(0).accepts(1));
    }

    #[test]
    fn arity_encodes_like_classic_redis() {
        assert_eq!(Arity::Fix(1).encode(), 2);
        assert_eq!(Arity::Fix(0).encode(), 1);
        assert_eq!(Arity::Minimum(2).encode(), -3);
        assert_eq!(Arity::Minimum(0).encode(), -1);
    }

    #[test]
    fn flags_compose_and_name_themselves() {
        let flags = CmdFlags::write() | CmdFlags::deny_oom() | CmdFlags::fast();
        assert!(flags.is_write());
        assert!(!flags.is_readonly());
        assert_eq!(flags.names(), vec!["write", "denyoom", "fast"]);
        assert_eq!(CmdFlags::none().names(), Vec::<&str>::new());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let table = CMD_TABLE.clone();
        assert!(table.lookup(b"get").is_some());
        assert!(table.lookup(b"GeT").is_some());
        assert!(table.lookup(b"GET").is_some());
        assert!(table.lookup(b"NOPE").is_none());
    }

    #[test]
    fn table_covers_the_required_verbs() {
        let table = CMD_TABLE.clone();
        for name in [
            "KEYS", "EXISTS", "DEL", "TYPE", "RENAME", "RENAMENX", "DBSIZE", "EXPIRE", "PEXPIRE",
            "EXPIREAT", "PEXPIREAT", "TTL", "PTTL", "PERSIST", "GET", "SET", "SETNX", "SETEX",
            "PSETEX", "GETSET", "APPEND", "STRLEN", "GETRANGE", "SUBSTR", "SETRANGE", "MGET",
            "MSET", "MSETNX", "INCR", "DECR", "INCRBY", "DECRBY", "LLEN", "LRANGE", "LINDEX",
            "LSET", "LPUSH", "RPUSH", "LPUSHX", "RPUSHX", "LPOP", "RPOP", "HLEN", "HGETALL",
            "HGET", "HEXISTS", "HSTRLEN", "HKEYS", "HVALS", "HSET", "HSETNX", "HINCRBY", "HMSET",
            "HMGET", "HDEL", "SCARD", "SMEMBERS", "SISMEMBER", "SADD", "SREM", "SDIFF", "SINTER",
            "SUNION", "SDIFFSTORE", "SINTERSTORE", "SUNIONSTORE", "PUBLISH", "SUBSCRIBE",
            "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "PUBSUB", "PING", "ECHO", "QUIT",
            "SELECT", "SWAPDB", "MONITOR", "SAVE", "BGSAVE", "LASTSAVE", "COMMAND", "CLIENT",
        ] {
            assert!(table.lookup(name.as_bytes()).is_some(), "{name} missing from table");
        }
    }

    #[test]
    fn extract_keys_honors_first_last_step() {
        let table = CMD_TABLE.clone();
        let argv: Vec<Bytes> = ["MSET", "k1", "v1", "k2", "v2"]
            .iter()
            .map(|s| Bytes::copy_from_slice(s.as_bytes()))
            .collect();
        let mset = table.lookup(b"MSET").unwrap();
        let keys = extract_keys(&mset, &argv);
        assert_eq!(keys, vec![Bytes::from_static(b"k1"), Bytes::from_static(b"k2")]);

        let argv: Vec<Bytes> = ["DEL", "a", "b", "c"]
            .iter()
            .map(|s| Bytes::copy_from_slice(s.as_bytes()))
            .collect();
        let del = table.lookup(b"DEL").unwrap();
        assert_eq!(extract_keys(&del, &argv).len(), 3);

        let argv: Vec<Bytes> = ["DBSIZE"].iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect();
        let dbsize = table.lookup(b"DBSIZE").unwrap();
        assert!(extract_keys(&dbsize, &argv).is_empty());
    }
}
