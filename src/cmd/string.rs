use bytes::{Bytes, BytesMut};
use chrono::{TimeDelta, Utc};

use crate::cmd::{arg_int, read_string, CmdResult, CommandContext, CommandError};
use crate::obj::{normalize_range, RedisObject};
use crate::resp::RespValue;
use crate::util::parse_i64;

///
/// String commands.
///

pub(crate) async fn get_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let reply = match read_string(db, &key)? {
        Some(value) => RespValue::bulk(value.clone()),
        None => RespValue::null_bulk(),
    };
    Ok(Some(reply))
}

/// SET key value [EX seconds | PX millis] [NX | XX]
///
/// NX/XX misses answer with a null bulk and write nothing. A plain SET
/// drops any previous expiration; EX/PX installs a fresh one.
pub(crate) async fn set_command(
    key: Bytes,
    value: Bytes,
    options: Vec<Bytes>,
    ctx: &mut CommandContext,
) -> CmdResult {
    let mut expire: Option<TimeDelta> = None;
    let mut nx = false;
    let mut xx = false;
    let mut iter = options.iter();
    while let Some(option) = iter.next() {
        match option.to_ascii_uppercase().as_slice() {
            b"EX" => {
                let seconds = arg_int(iter.next().ok_or(CommandError::Syntax)?)?;
                if seconds <= 0 {
                    return Err(CommandError::Syntax);
                }
                expire = Some(TimeDelta::try_seconds(seconds).ok_or(CommandError::Syntax)?);
            }
            b"PX" => {
                let millis = arg_int(iter.next().ok_or(CommandError::Syntax)?)?;
                if millis <= 0 {
                    return Err(CommandError::Syntax);
                }
                expire = Some(TimeDelta::try_milliseconds(millis).ok_or(CommandError::Syntax)?);
            }
            b"NX" => nx = true,
            b"XX" => xx = true,
            _ => return Err(CommandError::Syntax),
        }
    }
    if nx && xx {
        return Err(CommandError::Syntax);
    }

    let index = ctx.db_index();
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[index];
    let exists = db.contains_key(&key);
    if (nx && exists) || (xx && !exists) {
        return Ok(Some(RespValue::null_bulk()));
    }
    db.insert(key.clone(), RedisObject::String(value));
    match expire {
        Some(delta) => {
            let at = Utc::now() + delta;
            db.set_expire(key, at);
            ctx.server.dbs.schedule_expiration(index, at);
        }
        None => {
            db.remove_expire(&key);
        }
    }
    db.signal_modified();
    Ok(Some(RespValue::ok()))
}

pub(crate) async fn setnx_command(key: Bytes, value: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    if db.contains_key(&key) {
        return Ok(Some(RespValue::Integer(0)));
    }
    db.insert(key, RedisObject::String(value));
    db.signal_modified();
    Ok(Some(RespValue::Integer(1)))
}

pub(crate) async fn setex_command(key: Bytes, seconds: i64, value: Bytes, ctx: &mut CommandContext) -> CmdResult {
    if seconds <= 0 {
        return Err(CommandError::Syntax);
    }
    let delta = TimeDelta::try_seconds(seconds).ok_or(CommandError::Syntax)?;
    setex_generic(key, delta, value, ctx).await
}

pub(crate) async fn psetex_command(key: Bytes, millis: i64, value: Bytes, ctx: &mut CommandContext) -> CmdResult {
    if millis <= 0 {
        return Err(CommandError::Syntax);
    }
    let delta = TimeDelta::try_milliseconds(millis).ok_or(CommandError::Syntax)?;
    setex_generic(key, delta, value, ctx).await
}

async fn setex_generic(
    key: Bytes,
    delta: TimeDelta,
    value: Bytes,
    ctx: &mut CommandContext,
) -> CmdResult {
    let index = ctx.db_index();
    let at = Utc::now() + delta;
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[index];
    db.insert(key.clone(), RedisObject::String(value));
    db.set_expire(key, at);
    db.signal_modified();
    ctx.server.dbs.schedule_expiration(index, at);
    Ok(Some(RespValue::ok()))
}

/// GETSET answers the old string (or null) and stores the new one,
/// shedding any expiration like a plain SET.
pub(crate) async fn getset_command(key: Bytes, value: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let old = match read_string(db, &key)? {
        Some(s) => RespValue::bulk(s.clone()),
        None => RespValue::null_bulk(),
    };
    db.insert(key.clone(), RedisObject::String(value));
    db.remove_expire(&key);
    db.signal_modified();
    Ok(Some(old))
}

pub(crate) async fn append_command(key: Bytes, value: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let appended = match read_string(db, &key)? {
        None => value,
        Some(existing) => {
            let mut buf = BytesMut::with_capacity(existing.len() + value.len());
            buf.extend_from_slice(existing);
            buf.extend_from_slice(&value);
            buf.freeze()
        }
    };
    let length = appended.len();
    db.insert(key, RedisObject::String(appended));
    db.signal_modified();
    Ok(Some(RespValue::Integer(length as i64)))
}

pub(crate) async fn strlen_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let length = read_string(db, &key)?.map_or(0, Bytes::len);
    Ok(Some(RespValue::Integer(length as i64)))
}

pub(crate) async fn getrange_command(key: Bytes, start: i64, stop: i64, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let reply = match read_string(db, &key)? {
        None => RespValue::bulk(Bytes::new()),
        Some(s) => match normalize_range(start, stop, s.len()) {
            None => RespValue::bulk(Bytes::new()),
            Some((from, to)) => RespValue::bulk(s.slice(from..=to)),
        },
    };
    Ok(Some(reply))
}

/// SETRANGE zero-pads the gap between the current length and the
/// offset; on a missing key the pad starts at offset 0. Answers the
/// resulting length.
pub(crate) async fn setrange_command(key: Bytes, offset: i64, value: Bytes, ctx: &mut CommandContext) -> CmdResult {
    if offset < 0 {
        return Err(CommandError::OffsetOutOfRange);
    }
    let offset = offset as usize;
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let existing = read_string(db, &key)?.cloned().unwrap_or_default();
    if value.is_empty() {
        return Ok(Some(RespValue::Integer(existing.len() as i64)));
    }
    let end = offset + value.len();
    let mut buf = BytesMut::with_capacity(end.max(existing.len()));
    buf.extend_from_slice(&existing);
    if buf.len() < end {
        buf.resize(end, 0);
    }
    buf[offset..end].copy_from_slice(&value);
    let length = buf.len();
    db.insert(key, RedisObject::String(buf.freeze()));
    db.signal_modified();
    Ok(Some(RespValue::Integer(length as i64)))
}

/// Non-string values answer null rather than failing the whole call.
pub(crate) async fn mget_command(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let replies = keys
        .iter()
        .map(|key| match db.lookup(key) {
            Some(RedisObject::String(s)) => RespValue::bulk(s.clone()),
            _ => RespValue::null_bulk(),
        })
        .collect();
    Ok(Some(RespValue::array(replies)))
}

pub(crate) async fn mset_command(pairs: Vec<(Bytes, Bytes)>, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    for (key, value) in pairs {
        db.insert(key.clone(), RedisObject::String(value));
        db.remove_expire(&key);
    }
    db.signal_modified();
    Ok(Some(RespValue::ok()))
}

/// MSETNX stores nothing at all when any key already exists.
pub(crate) async fn msetnx_command(pairs: Vec<(Bytes, Bytes)>, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    if pairs.iter().any(|(key, _)| db.contains_key(key)) {
        return Ok(Some(RespValue::Integer(0)));
    }
    for (key, value) in pairs {
        db.insert(key, RedisObject::String(value));
    }
    db.signal_modified();
    Ok(Some(RespValue::Integer(1)))
}

pub(crate) async fn incr_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    incr_decr(key, 1, ctx).await
}

pub(crate) async fn decr_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    incr_decr(key, -1, ctx).await
}

pub(crate) async fn incrby_command(key: Bytes, delta: i64, ctx: &mut CommandContext) -> CmdResult {
    incr_decr(key, delta, ctx).await
}

pub(crate) async fn decrby_command(key: Bytes, delta: i64, ctx: &mut CommandContext) -> CmdResult {
    incr_decr(key, delta.checked_neg().ok_or(CommandError::NotAnInteger)?, ctx).await
}

/// A missing key counts from zero; the stored form stays the decimal
/// ASCII string, so the key remains a plain GET-able string.
async fn incr_decr(key: Bytes, delta: i64, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let current = match db.lookup(&key) {
        None => 0,
        Some(RedisObject::String(s)) => parse_i64(s).ok_or(CommandError::NotAnInteger)?,
        Some(_) => return Err(CommandError::WrongType),
    };
    let value = current.checked_add(delta).ok_or(CommandError::NotAnInteger)?;
    db.insert(key, RedisObject::String(Bytes::from(value.to_string())));
    db.signal_modified();
    Ok(Some(RespValue::Integer(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::testing::test_context;

    fn b(s: &[u8]) -> Bytes {
        Bytes::copy_from_slice(s)
    }

    #[tokio::test]
    async fn set_get_round_trip_is_binary_safe() {
        let (_server, mut ctx, _rx) = test_context().await;
        let payload = b(b"bin\x00\r\nvalue\xff");
        set_command(b(b"k"), payload.clone(), vec![], &mut ctx).await.unwrap();
        let got = get_command(b(b"k"), &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::bulk(payload)));
    }

    #[tokio::test]
    async fn get_missing_is_null_and_wrong_type_fails() {
        let (_server, mut ctx, _rx) = test_context().await;
        assert_eq!(get_command(b(b"nope"), &mut ctx).await.unwrap(), Some(RespValue::null_bulk()));

        crate::cmd::list::rpush_command(b(b"l"), vec![b(b"x")], &mut ctx).await.unwrap();
        assert_eq!(get_command(b(b"l"), &mut ctx).await.unwrap_err(), CommandError::WrongType);
    }

    #[tokio::test]
    async fn set_nx_and_xx() {
        let (_server, mut ctx, _rx) = test_context().await;
        // XX on a missing key stores nothing
        let got = set_command(b(b"k"), b(b"v"), vec![b(b"XX")], &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::null_bulk()));
        assert_eq!(get_command(b(b"k"), &mut ctx).await.unwrap(), Some(RespValue::null_bulk()));

        // NX stores once, then yields null
        let got = set_command(b(b"k"), b(b"v1"), vec![b(b"nx")], &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::ok()));
        let got = set_command(b(b"k"), b(b"v2"), vec![b(b"NX")], &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::null_bulk()));
        assert_eq!(get_command(b(b"k"), &mut ctx).await.unwrap(), Some(RespValue::bulk(&b"v1"[..])));

        // both at once is nonsense
        let got = set_command(b(b"k"), b(b"v"), vec![b(b"NX"), b(b"XX")], &mut ctx).await;
        assert_eq!(got.unwrap_err(), CommandError::Syntax);
    }

    #[tokio::test]
    async fn plain_set_clears_expiration_ex_installs_one() {
        let (server, mut ctx, _rx) = test_context().await;
        set_command(b(b"k"), b(b"v"), vec![b(b"EX"), b(b"100")], &mut ctx).await.unwrap();
        {
            let dbs = server.server.dbs.read().await;
            assert!(dbs[0].expire_at(b"k").is_some());
        }
        set_command(b(b"k"), b(b"v2"), vec![], &mut ctx).await.unwrap();
        {
            let dbs = server.server.dbs.read().await;
            assert!(dbs[0].expire_at(b"k").is_none());
        }
    }

    #[tokio::test]
    async fn setex_rejects_non_positive_expire() {
        let (_server, mut ctx, _rx) = test_context().await;
        let got = setex_command(b(b"k"), 0, b(b"v"), &mut ctx).await;
        assert_eq!(got.unwrap_err(), CommandError::Syntax);
    }

    #[tokio::test]
    async fn getset_returns_old_value_and_drops_ttl() {
        let (server, mut ctx, _rx) = test_context().await;
        assert_eq!(
            getset_command(b(b"k"), b(b"new"), &mut ctx).await.unwrap(),
            Some(RespValue::null_bulk())
        );
        setex_command(b(b"k"), 100, b(b"old"), &mut ctx).await.unwrap();
        assert_eq!(
            getset_command(b(b"k"), b(b"newer"), &mut ctx).await.unwrap(),
            Some(RespValue::bulk(&b"old"[..]))
        );
        let dbs = server.server.dbs.read().await;
        assert!(dbs[0].expire_at(b"k").is_none());
    }

    #[tokio::test]
    async fn append_creates_then_extends() {
        let (_server, mut ctx, _rx) = test_context().await;
        assert_eq!(
            append_command(b(b"k"), b(b"hello"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(5))
        );
        assert_eq!(
            append_command(b(b"k"), b(b" world"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(11))
        );
        assert_eq!(
            get_command(b(b"k"), &mut ctx).await.unwrap(),
            Some(RespValue::bulk(&b"hello world"[..]))
        );
    }

    #[tokio::test]
    async fn getrange_clamps_negative_indices() {
        let (_server, mut ctx, _rx) = test_context().await;
        set_command(b(b"k"), b(b"abc"), vec![], &mut ctx).await.unwrap();
        let got = getrange_command(b(b"k"), -100, -1, &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::bulk(&b"abc"[..])));
        let got = getrange_command(b(b"k"), 1, 1, &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::bulk(&b"b"[..])));
        let got = getrange_command(b(b"k"), 5, 9, &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::bulk(Bytes::new())));
        let got = getrange_command(b(b"missing"), 0, -1, &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::bulk(Bytes::new())));
    }

    #[tokio::test]
    async fn setrange_zero_pads_missing_prefix() {
        let (_server, mut ctx, _rx) = test_context().await;
        let got = setrange_command(b(b"k"), 5, b(b"ab"), &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::Integer(7)));
        assert_eq!(
            get_command(b(b"k"), &mut ctx).await.unwrap(),
            Some(RespValue::bulk(&b"\x00\x00\x00\x00\x00ab"[..]))
        );

        // overwrite inside an existing string keeps the tail
        setrange_command(b(b"k"), 0, b(b"XY"), &mut ctx).await.unwrap();
        assert_eq!(
            get_command(b(b"k"), &mut ctx).await.unwrap(),
            Some(RespValue::bulk(&b"XY\x00\x00\x00ab"[..]))
        );

        let got = setrange_command(b(b"k"), -1, b(b"z"), &mut ctx).await;
        assert_eq!(got.unwrap_err(), CommandError::OffsetOutOfRange);
    }

    #[tokio::test]
    async fn mget_mixes_hits_misses_and_wrong_types() {
        let (_server, mut ctx, _rx) = test_context().await;
        set_command(b(b"a"), b(b"1"), vec![], &mut ctx).await.unwrap();
        crate::cmd::list::rpush_command(b(b"l"), vec![b(b"x")], &mut ctx).await.unwrap();
        let got = mget_command(vec![b(b"a"), b(b"missing"), b(b"l")], &mut ctx).await.unwrap();
        assert_eq!(
            got,
            Some(RespValue::array(vec![
                RespValue::bulk(&b"1"[..]),
                RespValue::null_bulk(),
                RespValue::null_bulk(),
            ]))
        );
    }

    #[tokio::test]
    async fn msetnx_is_all_or_nothing() {
        let (_server, mut ctx, _rx) = test_context().await;
        let pairs = vec![(b(b"a"), b(b"1")), (b(b"b"), b(b"2"))];
        assert_eq!(msetnx_command(pairs, &mut ctx).await.unwrap(), Some(RespValue::Integer(1)));
        let pairs = vec![(b(b"c"), b(b"3")), (b(b"a"), b(b"other"))];
        assert_eq!(msetnx_command(pairs, &mut ctx).await.unwrap(), Some(RespValue::Integer(0)));
        assert_eq!(get_command(b(b"c"), &mut ctx).await.unwrap(), Some(RespValue::null_bulk()));
        assert_eq!(get_command(b(b"a"), &mut ctx).await.unwrap(), Some(RespValue::bulk(&b"1"[..])));
    }

    #[tokio::test]
    async fn incr_decr_family() {
        let (_server, mut ctx, _rx) = test_context().await;
        assert_eq!(incr_command(b(b"n"), &mut ctx).await.unwrap(), Some(RespValue::Integer(1)));
        assert_eq!(incrby_command(b(b"n"), 41, &mut ctx).await.unwrap(), Some(RespValue::Integer(42)));
        assert_eq!(decr_command(b(b"n"), &mut ctx).await.unwrap(), Some(RespValue::Integer(41)));
        assert_eq!(decrby_command(b(b"n"), 40, &mut ctx).await.unwrap(), Some(RespValue::Integer(1)));
        assert_eq!(
            get_command(b(b"n"), &mut ctx).await.unwrap(),
            Some(RespValue::bulk(&b"1"[..]))
        );

        set_command(b(b"s"), b(b"not a number"), vec![], &mut ctx).await.unwrap();
        assert_eq!(incr_command(b(b"s"), &mut ctx).await.unwrap_err(), CommandError::NotAnInteger);

        set_command(b(b"big"), b(i64::MAX.to_string().as_bytes()), vec![], &mut ctx).await.unwrap();
        assert_eq!(incr_command(b(b"big"), &mut ctx).await.unwrap_err(), CommandError::NotAnInteger);
    }

    #[tokio::test]
    async fn writes_bump_the_change_counter_once() {
        let (server, mut ctx, _rx) = test_context().await;
        let before = server.server.dbs.read().await[0].dirty();
        mset_command(vec![(b(b"a"), b(b"1")), (b(b"b"), b(b"2"))], &mut ctx).await.unwrap();
        let after = server.server.dbs.read().await[0].dirty();
        assert_eq!(after, before + 1);
    }
}
