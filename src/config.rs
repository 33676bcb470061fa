use std::path::PathBuf;
use std::sync::Arc;

use crate::cmd::{CommandTable, CMD_TABLE};
use crate::db::SaveParam;

///
/// Programmatic server configuration. The executable fills this from its
/// command line; embedders build it directly.
///

pub const DEFAULT_PORT: u16 = 6379;

#[derive(Clone)]
pub struct RedisConfig {
    /// Bind address; `None` binds every interface.
    pub host: Option<String>,
    pub port: u16,
    pub db_filename: PathBuf,
    pub save_points: Vec<SaveParam>,
    /// Worker threads for the I/O runtime; `None` leaves the runtime at
    /// its default (one worker per core).
    pub worker_threads: Option<usize>,
    /// Command table; swap it out to embed a restricted server.
    pub commands: Arc<CommandTable>,
    /// Emit the startup banner even when the log filter would drop it.
    pub always_show_log: bool,
}

impl Default for RedisConfig {
    fn default() -> RedisConfig {
        RedisConfig {
            host: None,
            port: DEFAULT_PORT,
            db_filename: PathBuf::from("dump.json"),
            save_points: vec![
                SaveParam { seconds: 60 * 60, changes: 1 },   // save after 1 hour and 1 change
                SaveParam { seconds: 300, changes: 100 },     // save after 5 minutes and 100 changes
                SaveParam { seconds: 60, changes: 10000 },    // save after 1 minute and 10000 changes
            ],
            worker_threads: None,
            commands: CMD_TABLE.clone(),
            always_show_log: false,
        }
    }
}
