use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

use crate::cmd::{CmdResult, CommandContext, CommandError};
use crate::resp::RespValue;

///
/// Expiration commands. Deadlines are wall-clock instants; a deadline
/// already in the past removes the key on the spot instead of parking
/// it for the sweeper.
///

pub(crate) async fn expire_command(key: Bytes, seconds: i64, ctx: &mut CommandContext) -> CmdResult {
    let delta = TimeDelta::try_seconds(seconds).ok_or(CommandError::NotAnInteger)?;
    expire_generic(key, Utc::now() + delta, ctx).await
}

pub(crate) async fn pexpire_command(key: Bytes, millis: i64, ctx: &mut CommandContext) -> CmdResult {
    let delta = TimeDelta::try_milliseconds(millis).ok_or(CommandError::NotAnInteger)?;
    expire_generic(key, Utc::now() + delta, ctx).await
}

pub(crate) async fn expireat_command(key: Bytes, timestamp: i64, ctx: &mut CommandContext) -> CmdResult {
    let at = DateTime::from_timestamp(timestamp, 0).ok_or(CommandError::NotAnInteger)?;
    expire_generic(key, at, ctx).await
}

pub(crate) async fn pexpireat_command(key: Bytes, timestamp: i64, ctx: &mut CommandContext) -> CmdResult {
    let at = DateTime::from_timestamp_millis(timestamp).ok_or(CommandError::NotAnInteger)?;
    expire_generic(key, at, ctx).await
}

/// 1 when the key existed (even if the past deadline deleted it on the
/// spot), 0 when it did not.
async fn expire_generic(key: Bytes, at: DateTime<Utc>, ctx: &mut CommandContext) -> CmdResult {
    let index = ctx.db_index();
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[index];
    if !db.contains_key(&key) {
        return Ok(Some(RespValue::Integer(0)));
    }
    if at <= Utc::now() {
        db.remove(&key);
        db.signal_modified();
        return Ok(Some(RespValue::Integer(1)));
    }
    db.set_expire(key, at);
    db.signal_modified();
    ctx.server.dbs.schedule_expiration(index, at);
    Ok(Some(RespValue::Integer(1)))
}

pub(crate) async fn ttl_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    ttl_generic(key, false, ctx).await
}

pub(crate) async fn pttl_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    ttl_generic(key, true, ctx).await
}

/// -2 for a missing key, -1 for a key without expiration, otherwise the
/// remaining time: milliseconds as-is, seconds rounded to the nearest
/// (so a freshly set 1-second expiration still reads 1). An expired key
/// the sweeper has not reached yet reads 0.
async fn ttl_generic(key: Bytes, in_millis: bool, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    if !db.contains_key(&key) {
        return Ok(Some(RespValue::Integer(-2)));
    }
    let Some(at) = db.expire_at(&key) else {
        return Ok(Some(RespValue::Integer(-1)));
    };
    let millis = (at - Utc::now()).num_milliseconds().max(0);
    let remaining = if in_millis { millis } else { (millis + 500) / 1000 };
    Ok(Some(RespValue::Integer(remaining)))
}

pub(crate) async fn persist_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    if db.remove_expire(&key) {
        db.signal_modified();
        Ok(Some(RespValue::Integer(1)))
    } else {
        Ok(Some(RespValue::Integer(0)))
    }
}
