use bytes::Bytes;

use crate::cmd::{list_mut, read_list, CmdResult, CommandContext, CommandError};
use crate::obj::{normalize_index, normalize_range};
use crate::resp::RespValue;

///
/// List commands. A list emptied by pops stays in the keyspace; only
/// DEL removes the key.
///

pub(crate) async fn llen_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let length = read_list(db, &key)?.map_or(0, |l| l.len());
    Ok(Some(RespValue::Integer(length as i64)))
}

pub(crate) async fn lrange_command(key: Bytes, start: i64, stop: i64, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let Some(list) = read_list(db, &key)? else {
        return Ok(Some(RespValue::array(Vec::new())));
    };
    let Some((from, to)) = normalize_range(start, stop, list.len()) else {
        return Ok(Some(RespValue::array(Vec::new())));
    };
    let items = list
        .iter()
        .skip(from)
        .take(to - from + 1)
        .map(|item| RespValue::bulk(item.clone()))
        .collect();
    Ok(Some(RespValue::array(items)))
}

pub(crate) async fn lindex_command(key: Bytes, index: i64, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let reply = read_list(db, &key)?
        .and_then(|list| normalize_index(index, list.len()).and_then(|at| list.get(at)))
        .map_or_else(RespValue::null_bulk, |item| RespValue::bulk(item.clone()));
    Ok(Some(reply))
}

pub(crate) async fn lset_command(key: Bytes, index: i64, value: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let Some(list) = list_mut(db, &key, false)? else {
        return Err(CommandError::NoSuchKey);
    };
    let Some(at) = normalize_index(index, list.len()) else {
        return Err(CommandError::IndexOutOfRange);
    };
    list[at] = value;
    db.signal_modified();
    Ok(Some(RespValue::ok()))
}

pub(crate) async fn lpush_command(key: Bytes, values: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    push_generic(key, values, true, true, ctx).await
}

pub(crate) async fn rpush_command(key: Bytes, values: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    push_generic(key, values, false, true, ctx).await
}

pub(crate) async fn lpushx_command(key: Bytes, values: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    push_generic(key, values, true, false, ctx).await
}

pub(crate) async fn rpushx_command(key: Bytes, values: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    push_generic(key, values, false, false, ctx).await
}

/// LPUSH a b c leaves the list as c b a: each value goes to the head in
/// argument order. The X variants answer 0 without creating a missing
/// key.
async fn push_generic(
    key: Bytes,
    values: Vec<Bytes>,
    head: bool,
    create: bool,
    ctx: &mut CommandContext,
) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let Some(list) = list_mut(db, &key, create)? else {
        return Ok(Some(RespValue::Integer(0)));
    };
    for value in values {
        if head {
            list.push_front(value);
        } else {
            list.push_back(value);
        }
    }
    let length = list.len();
    db.signal_modified();
    Ok(Some(RespValue::Integer(length as i64)))
}

pub(crate) async fn lpop_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    pop_generic(key, true, ctx).await
}

pub(crate) async fn rpop_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    pop_generic(key, false, ctx).await
}

async fn pop_generic(key: Bytes, head: bool, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let Some(list) = list_mut(db, &key, false)? else {
        return Ok(Some(RespValue::null_bulk()));
    };
    let popped = if head { list.pop_front() } else { list.pop_back() };
    match popped {
        Some(value) => {
            db.signal_modified();
            Ok(Some(RespValue::bulk(value)))
        }
        None => Ok(Some(RespValue::null_bulk())),
    }
}
