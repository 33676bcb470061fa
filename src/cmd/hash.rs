use bytes::Bytes;

use crate::cmd::{arg_int, hash_mut, read_hash, CmdResult, CommandContext, CommandError};
use crate::resp::RespValue;
use crate::util::parse_i64;

///
/// Hash commands.
///

pub(crate) async fn hlen_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let length = read_hash(db, &key)?.map_or(0, |h| h.len());
    Ok(Some(RespValue::Integer(length as i64)))
}

pub(crate) async fn hgetall_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let mut items = Vec::new();
    if let Some(hash) = read_hash(db, &key)? {
        items.reserve(hash.len() * 2);
        for (field, value) in hash {
            items.push(RespValue::bulk(field.clone()));
            items.push(RespValue::bulk(value.clone()));
        }
    }
    Ok(Some(RespValue::array(items)))
}

pub(crate) async fn hget_command(key: Bytes, field: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let reply = read_hash(db, &key)?
        .and_then(|hash| hash.get(&field))
        .map_or_else(RespValue::null_bulk, |value| RespValue::bulk(value.clone()));
    Ok(Some(reply))
}

pub(crate) async fn hexists_command(key: Bytes, field: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let exists = read_hash(db, &key)?.map_or(false, |hash| hash.contains_key(&field));
    Ok(Some(RespValue::Integer(exists as i64)))
}

pub(crate) async fn hstrlen_command(key: Bytes, field: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let length = read_hash(db, &key)?
        .and_then(|hash| hash.get(&field))
        .map_or(0, Bytes::len);
    Ok(Some(RespValue::Integer(length as i64)))
}

pub(crate) async fn hkeys_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let fields = read_hash(db, &key)?
        .map(|hash| hash.keys().map(|f| RespValue::bulk(f.clone())).collect())
        .unwrap_or_default();
    Ok(Some(RespValue::array(fields)))
}

pub(crate) async fn hvals_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let values = read_hash(db, &key)?
        .map(|hash| hash.values().map(|v| RespValue::bulk(v.clone())).collect())
        .unwrap_or_default();
    Ok(Some(RespValue::array(values)))
}

/// Answers 1 for a brand new field, 0 for an update.
pub(crate) async fn hset_command(key: Bytes, field: Bytes, value: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let hash = hash_mut(db, &key, true)?.expect("created above");
    let created = hash.insert(field, value).is_none();
    db.signal_modified();
    Ok(Some(RespValue::Integer(created as i64)))
}

pub(crate) async fn hsetnx_command(key: Bytes, field: Bytes, value: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let hash = hash_mut(db, &key, true)?.expect("created above");
    if hash.contains_key(&field) {
        return Ok(Some(RespValue::Integer(0)));
    }
    hash.insert(field, value);
    db.signal_modified();
    Ok(Some(RespValue::Integer(1)))
}

/// A missing field counts from zero; a field holding anything but a
/// decimal integer refuses the increment.
pub(crate) async fn hincrby_command(key: Bytes, field: Bytes, delta: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let delta = arg_int(&delta)?;
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let hash = hash_mut(db, &key, true)?.expect("created above");
    let current = match hash.get(&field) {
        None => 0,
        Some(value) => parse_i64(value).ok_or(CommandError::NotAnInteger)?,
    };
    let value = current.checked_add(delta).ok_or(CommandError::NotAnInteger)?;
    hash.insert(field, Bytes::from(value.to_string()));
    db.signal_modified();
    Ok(Some(RespValue::Integer(value)))
}

/// HMSET key field value [field value ...] — always +OK.
pub(crate) async fn hmset_command(key: Bytes, args: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(CommandError::WrongArity("hmset".to_string()));
    }
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let hash = hash_mut(db, &key, true)?.expect("created above");
    for pair in args.chunks_exact(2) {
        hash.insert(pair[0].clone(), pair[1].clone());
    }
    db.signal_modified();
    Ok(Some(RespValue::ok()))
}

pub(crate) async fn hmget_command(key: Bytes, fields: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let hash = read_hash(db, &key)?;
    let replies = fields
        .iter()
        .map(|field| {
            hash.and_then(|h| h.get(field))
                .map_or_else(RespValue::null_bulk, |value| RespValue::bulk(value.clone()))
        })
        .collect();
    Ok(Some(RespValue::array(replies)))
}

pub(crate) async fn hdel_command(key: Bytes, fields: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let Some(hash) = hash_mut(db, &key, false)? else {
        return Ok(Some(RespValue::Integer(0)));
    };
    let mut removed = 0;
    for field in &fields {
        if hash.remove(field).is_some() {
            removed += 1;
        }
    }
    if removed > 0 {
        db.signal_modified();
    }
    Ok(Some(RespValue::Integer(removed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::testing::test_context;

    fn b(s: &[u8]) -> Bytes {
        Bytes::copy_from_slice(s)
    }

    #[tokio::test]
    async fn hset_reports_new_field_then_update() {
        let (_server, mut ctx, _rx) = test_context().await;
        assert_eq!(
            hset_command(b(b"h"), b(b"f"), b(b"v"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(1))
        );
        assert_eq!(
            hset_command(b(b"h"), b(b"f"), b(b"v2"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(0))
        );
        assert_eq!(
            hget_command(b(b"h"), b(b"f"), &mut ctx).await.unwrap(),
            Some(RespValue::bulk(&b"v2"[..]))
        );
    }

    #[tokio::test]
    async fn hsetnx_only_writes_absent_fields() {
        let (_server, mut ctx, _rx) = test_context().await;
        assert_eq!(
            hsetnx_command(b(b"h"), b(b"f"), b(b"v"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(1))
        );
        assert_eq!(
            hsetnx_command(b(b"h"), b(b"f"), b(b"other"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(0))
        );
        assert_eq!(
            hget_command(b(b"h"), b(b"f"), &mut ctx).await.unwrap(),
            Some(RespValue::bulk(&b"v"[..]))
        );
    }

    #[tokio::test]
    async fn hmset_hgetall_hdel_hexists_scenario() {
        let (_server, mut ctx, _rx) = test_context().await;
        let got = hmset_command(
            b(b"u"),
            vec![b(b"name"), b(b"alice"), b(b"age"), b(b"30")],
            &mut ctx,
        )
        .await
        .unwrap();
        assert_eq!(got, Some(RespValue::ok()));

        let Some(RespValue::Array(Some(items))) = hgetall_command(b(b"u"), &mut ctx).await.unwrap() else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 4);
        assert!(items.contains(&RespValue::bulk(&b"name"[..])));
        assert!(items.contains(&RespValue::bulk(&b"alice"[..])));

        assert_eq!(
            hdel_command(b(b"u"), vec![b(b"age")], &mut ctx).await.unwrap(),
            Some(RespValue::Integer(1))
        );
        assert_eq!(
            hexists_command(b(b"u"), b(b"age"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(0))
        );
        assert_eq!(
            hexists_command(b(b"u"), b(b"name"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(1))
        );
    }

    #[tokio::test]
    async fn hmset_rejects_dangling_field() {
        let (_server, mut ctx, _rx) = test_context().await;
        let got = hmset_command(b(b"h"), vec![b(b"f1"), b(b"v1"), b(b"f2")], &mut ctx).await;
        assert_eq!(got.unwrap_err(), CommandError::WrongArity("hmset".to_string()));
    }

    #[tokio::test]
    async fn hincrby_creates_and_validates() {
        let (_server, mut ctx, _rx) = test_context().await;
        assert_eq!(
            hincrby_command(b(b"h"), b(b"n"), b(b"5"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(5))
        );
        assert_eq!(
            hincrby_command(b(b"h"), b(b"n"), b(b"-7"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(-2))
        );
        hset_command(b(b"h"), b(b"s"), b(b"text"), &mut ctx).await.unwrap();
        assert_eq!(
            hincrby_command(b(b"h"), b(b"s"), b(b"1"), &mut ctx).await.unwrap_err(),
            CommandError::NotAnInteger
        );
        assert_eq!(
            hincrby_command(b(b"h"), b(b"n"), b(b"nope"), &mut ctx).await.unwrap_err(),
            CommandError::NotAnInteger
        );
    }

    #[tokio::test]
    async fn hmget_keeps_field_order_with_nulls() {
        let (_server, mut ctx, _rx) = test_context().await;
        hmset_command(b(b"h"), vec![b(b"a"), b(b"1"), b(b"c"), b(b"3")], &mut ctx).await.unwrap();
        let got = hmget_command(b(b"h"), vec![b(b"a"), b(b"b"), b(b"c")], &mut ctx).await.unwrap();
        assert_eq!(
            got,
            Some(RespValue::array(vec![
                RespValue::bulk(&b"1"[..]),
                RespValue::null_bulk(),
                RespValue::bulk(&b"3"[..]),
            ]))
        );
        // a missing key answers nulls for every field
        let got = hmget_command(b(b"none"), vec![b(b"x")], &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::array(vec![RespValue::null_bulk()])));
    }

    #[tokio::test]
    async fn hstrlen_and_hlen_and_key_views() {
        let (_server, mut ctx, _rx) = test_context().await;
        hmset_command(b(b"h"), vec![b(b"f"), b(b"hello")], &mut ctx).await.unwrap();
        assert_eq!(hstrlen_command(b(b"h"), b(b"f"), &mut ctx).await.unwrap(), Some(RespValue::Integer(5)));
        assert_eq!(hstrlen_command(b(b"h"), b(b"g"), &mut ctx).await.unwrap(), Some(RespValue::Integer(0)));
        assert_eq!(hlen_command(b(b"h"), &mut ctx).await.unwrap(), Some(RespValue::Integer(1)));
        assert_eq!(
            hkeys_command(b(b"h"), &mut ctx).await.unwrap(),
            Some(RespValue::array(vec![RespValue::bulk(&b"f"[..])]))
        );
        assert_eq!(
            hvals_command(b(b"h"), &mut ctx).await.unwrap(),
            Some(RespValue::array(vec![RespValue::bulk(&b"hello"[..])]))
        );
    }

    #[tokio::test]
    async fn wrong_type_is_rejected() {
        let (_server, mut ctx, _rx) = test_context().await;
        crate::cmd::string::set_command(b(b"s"), b(b"v"), vec![], &mut ctx).await.unwrap();
        assert_eq!(
            hset_command(b(b"s"), b(b"f"), b(b"v"), &mut ctx).await.unwrap_err(),
            CommandError::WrongType
        );
        assert_eq!(
            hgetall_command(b(b"s"), &mut ctx).await.unwrap_err(),
            CommandError::WrongType
        );
    }
}
