use std::fmt::Write as FmtWrite;

use bytes::Bytes;
use chrono::Utc;
use tracing::info;

use crate::cmd::{arg_int, CmdResult, CommandContext, CommandError};
use crate::resp::RespValue;
use crate::server::REDIS_VERSION;

///
/// Server and connection commands.
///

pub(crate) async fn ping_command(message: Option<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let _ = ctx;
    let reply = match message {
        Some(message) => RespValue::bulk(message),
        None => RespValue::pong(),
    };
    Ok(Some(reply))
}

pub(crate) async fn echo_command(message: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let _ = ctx;
    Ok(Some(RespValue::bulk(message)))
}

/// QUIT: confirm, then let the connection loop flush and close.
pub(crate) async fn quit_command(ctx: &mut CommandContext) -> CmdResult {
    ctx.quit = true;
    Ok(Some(RespValue::ok()))
}

pub(crate) async fn select_command(index: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let index = arg_int(&index)?;
    if index < 0 || index as usize >= ctx.server.dbs.dbnum() {
        return Err(CommandError::DbIndexOutOfRange);
    }
    ctx.client.set_db_index(index as usize);
    Ok(Some(RespValue::ok()))
}

pub(crate) async fn swapdb_command(first: Bytes, second: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let first = arg_int(&first)?;
    let second = arg_int(&second)?;
    let dbnum = ctx.server.dbs.dbnum() as i64;
    if first < 0 || first >= dbnum || second < 0 || second >= dbnum {
        return Err(CommandError::DbIndexOutOfRange);
    }
    ctx.server.dbs.swap(first as usize, second as usize).await;
    Ok(Some(RespValue::ok()))
}

pub(crate) async fn monitor_command(ctx: &mut CommandContext) -> CmdResult {
    if !ctx.client.is_monitoring() {
        ctx.client.set_monitoring(true);
        ctx.server.add_monitor();
        info!(client = ctx.client.id(), "client entered monitor mode");
    }
    Ok(Some(RespValue::ok()))
}

pub(crate) async fn save_command(ctx: &mut CommandContext) -> CmdResult {
    ctx.server
        .snapshots
        .save()
        .await
        .map_err(|err| CommandError::Failed(err.to_string()))?;
    Ok(Some(RespValue::ok()))
}

pub(crate) async fn bgsave_command(ctx: &mut CommandContext) -> CmdResult {
    ctx.server
        .snapshots
        .background_save()
        .map_err(|err| CommandError::Failed(err.to_string()))?;
    Ok(Some(RespValue::simple("Background saving started")))
}

pub(crate) async fn lastsave_command(ctx: &mut CommandContext) -> CmdResult {
    let stats = ctx.server.snapshots.save_stats();
    Ok(Some(RespValue::Integer(stats.last_save.timestamp())))
}

/// SHUTDOWN [NOSAVE|SAVE]: a successful shutdown never answers.
pub(crate) async fn shutdown_command(mode: Option<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let save = match mode.map(|m| m.to_ascii_uppercase()) {
        None => true,
        Some(m) if m == b"SAVE" => true,
        Some(m) if m == b"NOSAVE" => false,
        Some(_) => return Err(CommandError::Syntax),
    };
    if save {
        ctx.server
            .snapshots
            .save()
            .await
            .map_err(|err| CommandError::Failed(err.to_string()))?;
    }
    info!("shutdown requested, exiting");
    std::process::exit(0);
}

/// COMMAND answers the whole table as six-tuples; COMMAND COUNT its size.
pub(crate) async fn command_command(sub: Option<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let table = ctx.server.commands();
    match sub {
        None => {
            let entries = table
                .commands()
                .iter()
                .map(|command| {
                    let flags = command
                        .flags
                        .names()
                        .into_iter()
                        .map(RespValue::simple)
                        .collect();
                    RespValue::array(vec![
                        RespValue::bulk(Bytes::from(command.name.to_ascii_lowercase())),
                        RespValue::Integer(command.arity.encode()),
                        RespValue::Array(Some(flags)),
                        RespValue::Integer(command.firstkey as i64),
                        RespValue::Integer(command.lastkey as i64),
                        RespValue::Integer(command.keystep as i64),
                    ])
                })
                .collect();
            Ok(Some(RespValue::array(entries)))
        }
        Some(sub) if sub.to_ascii_uppercase() == b"COUNT" => {
            Ok(Some(RespValue::Integer(table.len() as i64)))
        }
        Some(sub) => Err(CommandError::UnknownSubcommand(
            String::from_utf8_lossy(&sub).to_lowercase(),
        )),
    }
}

/// CLIENT SETNAME|GETNAME|LIST
pub(crate) async fn client_command(args: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    match args[0].to_ascii_uppercase().as_slice() {
        b"SETNAME" => {
            let [_, name] = args.as_slice() else {
                return Err(CommandError::Syntax);
            };
            if name.iter().any(|b| *b <= b' ') {
                return Err(CommandError::Syntax);
            }
            ctx.client.set_name(Some(name.clone()));
            Ok(Some(RespValue::ok()))
        }
        b"GETNAME" => {
            if args.len() != 1 {
                return Err(CommandError::Syntax);
            }
            let reply = match ctx.client.name() {
                Some(name) => RespValue::bulk(name),
                None => RespValue::bulk(Bytes::new()),
            };
            Ok(Some(reply))
        }
        b"LIST" => {
            if args.len() != 1 {
                return Err(CommandError::Syntax);
            }
            let mut out = String::new();
            for handle in ctx.server.client_handles() {
                out.push_str(&handle.info_line());
                out.push('\n');
            }
            Ok(Some(RespValue::bulk(Bytes::from(out))))
        }
        _ => Err(CommandError::UnknownSubcommand(
            String::from_utf8_lossy(&args[0]).to_lowercase(),
        )),
    }
}

/// INFO [section] as `field:value` lines grouped under `# Section`
/// headers, the classic text shape.
pub(crate) async fn info_command(section: Option<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let section = section.map(|s| s.to_ascii_lowercase());
    let want = |name: &str| section.as_deref().map_or(true, |s| s == name.as_bytes());
    let server = &ctx.server;
    let mut out = String::new();

    if want("server") {
        let uptime = (Utc::now() - server.start_time()).num_seconds().max(0);
        let _ = write!(
            out,
            "# Server\nredis_version:{}\nprocess_id:{}\ntcp_port:{}\nuptime_in_seconds:{}\n\n",
            REDIS_VERSION,
            server.pid(),
            server.config().port,
            uptime,
        );
    }
    if want("clients") {
        let _ = write!(out, "# Clients\nconnected_clients:{}\n\n", server.connected_clients());
    }
    if want("persistence") {
        let stats = server.snapshots.save_stats();
        let changes: u64 = {
            let dbs = server.dbs.read().await;
            dbs.iter().map(|db| db.dirty()).sum()
        };
        let _ = write!(
            out,
            "# Persistence\nrdb_changes_since_last_save:{}\nrdb_last_save_time:{}\nrdb_last_save_duration_ms:{}\n\n",
            changes,
            stats.last_save.timestamp(),
            stats.last_save_duration.as_millis(),
        );
    }
    if want("stats") {
        let _ = write!(
            out,
            "# Stats\ntotal_connections_received:{}\ntotal_commands_processed:{}\nmonitors:{}\n\n",
            server.stat_numconnections.load(std::sync::atomic::Ordering::Relaxed),
            server.stat_numcommands.load(std::sync::atomic::Ordering::Relaxed),
            server.monitor_count(),
        );
    }
    if want("keyspace") {
        out.push_str("# Keyspace\n");
        let dbs = server.dbs.read().await;
        for db in dbs.iter() {
            if !db.is_empty() {
                let _ = write!(out, "db{}:keys={},expires={}\n", db.id(), db.len(), db.expires().len());
            }
        }
    }
    Ok(Some(RespValue::bulk(Bytes::from(out))))
}
