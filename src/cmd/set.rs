use std::collections::HashSet;

use bytes::Bytes;

use crate::cmd::{read_set, set_mut, CmdResult, CommandContext, CommandError};
use crate::db::RedisDB;
use crate::obj::{set_diff, set_inter, set_union, RedisObject};
use crate::resp::RespValue;

///
/// Set commands, algebra included. A missing key behaves as the empty
/// set on the read side of every operation.
///

pub(crate) async fn scard_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let cardinality = read_set(db, &key)?.map_or(0, HashSet::len);
    Ok(Some(RespValue::Integer(cardinality as i64)))
}

pub(crate) async fn smembers_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let members = read_set(db, &key)?
        .map(|set| set.iter().map(|m| RespValue::bulk(m.clone())).collect())
        .unwrap_or_default();
    Ok(Some(RespValue::array(members)))
}

pub(crate) async fn sismember_command(key: Bytes, member: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let held = read_set(db, &key)?.map_or(false, |set| set.contains(&member));
    Ok(Some(RespValue::Integer(held as i64)))
}

pub(crate) async fn sadd_command(key: Bytes, members: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let set = set_mut(db, &key, true)?.expect("created above");
    let mut added = 0;
    for member in members {
        if set.insert(member) {
            added += 1;
        }
    }
    if added > 0 {
        db.signal_modified();
    }
    Ok(Some(RespValue::Integer(added)))
}

pub(crate) async fn srem_command(key: Bytes, members: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let Some(set) = set_mut(db, &key, false)? else {
        return Ok(Some(RespValue::Integer(0)));
    };
    let mut removed = 0;
    for member in &members {
        if set.remove(member) {
            removed += 1;
        }
    }
    if removed > 0 {
        db.signal_modified();
    }
    Ok(Some(RespValue::Integer(removed)))
}

#[derive(Clone, Copy)]
enum Algebra {
    Diff,
    Inter,
    Union,
}

fn evaluate(db: &RedisDB, keys: &[Bytes], op: Algebra) -> Result<HashSet<Bytes>, CommandError> {
    let empty = HashSet::new();
    let mut sets: Vec<&HashSet<Bytes>> = Vec::with_capacity(keys.len());
    for key in keys {
        sets.push(read_set(db, key)?.unwrap_or(&empty));
    }
    Ok(match op {
        Algebra::Diff => {
            let (first, rest) = sets.split_first().expect("arity guarantees one key");
            set_diff(first, rest)
        }
        Algebra::Inter => set_inter(&sets),
        Algebra::Union => set_union(&sets),
    })
}

async fn algebra_command(keys: Vec<Bytes>, op: Algebra, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let result = evaluate(db, &keys, op)?;
    let members = result.into_iter().map(RespValue::bulk).collect();
    Ok(Some(RespValue::array(members)))
}

/// The result is evaluated in full before the destination is touched,
/// so a destination that doubles as a source reads its old value. The
/// destination always ends up holding a set, even an empty one.
async fn algebra_store_command(keys: Vec<Bytes>, op: Algebra, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let destination = keys[0].clone();
    let result = evaluate(db, &keys[1..], op)?;
    let cardinality = result.len();
    db.insert(destination.clone(), RedisObject::Set(result));
    db.remove_expire(&destination);
    db.signal_modified();
    Ok(Some(RespValue::Integer(cardinality as i64)))
}

pub(crate) async fn sdiff_command(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    algebra_command(keys, Algebra::Diff, ctx).await
}

pub(crate) async fn sinter_command(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    algebra_command(keys, Algebra::Inter, ctx).await
}

pub(crate) async fn sunion_command(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    algebra_command(keys, Algebra::Union, ctx).await
}

pub(crate) async fn sdiffstore_command(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    algebra_store_command(keys, Algebra::Diff, ctx).await
}

pub(crate) async fn sinterstore_command(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    algebra_store_command(keys, Algebra::Inter, ctx).await
}

pub(crate) async fn sunionstore_command(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    algebra_store_command(keys, Algebra::Union, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::testing::test_context;

    fn b(s: &[u8]) -> Bytes {
        Bytes::copy_from_slice(s)
    }

    fn member_set(reply: CmdResult) -> HashSet<Bytes> {
        let Ok(Some(RespValue::Array(Some(items)))) = reply else {
            panic!("expected member array");
        };
        items
            .into_iter()
            .map(|item| match item {
                RespValue::BulkString(Some(m)) => m,
                other => panic!("expected bulk member, got {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn sadd_is_idempotent_per_member() {
        let (_server, mut ctx, _rx) = test_context().await;
        assert_eq!(
            sadd_command(b(b"s"), vec![b(b"m")], &mut ctx).await.unwrap(),
            Some(RespValue::Integer(1))
        );
        assert_eq!(
            sadd_command(b(b"s"), vec![b(b"m")], &mut ctx).await.unwrap(),
            Some(RespValue::Integer(0))
        );
        assert_eq!(scard_command(b(b"s"), &mut ctx).await.unwrap(), Some(RespValue::Integer(1)));
    }

    #[tokio::test]
    async fn srem_counts_removed_members_only() {
        let (_server, mut ctx, _rx) = test_context().await;
        sadd_command(b(b"s"), vec![b(b"a"), b(b"b")], &mut ctx).await.unwrap();
        assert_eq!(
            srem_command(b(b"s"), vec![b(b"a"), b(b"ghost")], &mut ctx).await.unwrap(),
            Some(RespValue::Integer(1))
        );
        assert_eq!(
            srem_command(b(b"missing"), vec![b(b"x")], &mut ctx).await.unwrap(),
            Some(RespValue::Integer(0))
        );
        assert_eq!(
            sismember_command(b(b"s"), b(b"a"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(0))
        );
        assert_eq!(
            sismember_command(b(b"s"), b(b"b"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(1))
        );
    }

    #[tokio::test]
    async fn algebra_scenario() {
        let (_server, mut ctx, _rx) = test_context().await;
        sadd_command(b(b"a"), vec![b(b"1"), b(b"2"), b(b"3")], &mut ctx).await.unwrap();
        sadd_command(b(b"b"), vec![b(b"2"), b(b"3"), b(b"4")], &mut ctx).await.unwrap();

        let inter = member_set(sinter_command(vec![b(b"a"), b(b"b")], &mut ctx).await);
        assert_eq!(inter, [b(b"2"), b(b"3")].into_iter().collect());

        let diff = member_set(sdiff_command(vec![b(b"a"), b(b"b")], &mut ctx).await);
        assert_eq!(diff, [b(b"1")].into_iter().collect());

        let union = member_set(sunion_command(vec![b(b"a"), b(b"b")], &mut ctx).await);
        assert_eq!(union.len(), 4);

        // a missing key acts as the empty set
        let diff = member_set(sdiff_command(vec![b(b"a"), b(b"nope")], &mut ctx).await);
        assert_eq!(diff.len(), 3);
    }

    #[tokio::test]
    async fn store_overwrites_destination_even_when_empty() {
        let (server, mut ctx, _rx) = test_context().await;
        sadd_command(b(b"a"), vec![b(b"1"), b(b"2"), b(b"3")], &mut ctx).await.unwrap();
        sadd_command(b(b"b"), vec![b(b"2"), b(b"3"), b(b"4")], &mut ctx).await.unwrap();

        let got = sinterstore_command(vec![b(b"c"), b(b"a"), b(b"b")], &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::Integer(2)));
        let members = member_set(smembers_command(b(b"c"), &mut ctx).await);
        assert_eq!(members, [b(b"2"), b(b"3")].into_iter().collect());

        // empty result still stores a set value
        let got = sinterstore_command(vec![b(b"c"), b(b"a"), b(b"empty")], &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::Integer(0)));
        let dbs = server.server.dbs.read().await;
        assert!(matches!(dbs[0].lookup(b"c"), Some(RedisObject::Set(s)) if s.is_empty()));
    }

    #[tokio::test]
    async fn store_with_destination_as_source_reads_old_value() {
        let (_server, mut ctx, _rx) = test_context().await;
        sadd_command(b(b"dst"), vec![b(b"1"), b(b"2")], &mut ctx).await.unwrap();
        sadd_command(b(b"other"), vec![b(b"2"), b(b"3")], &mut ctx).await.unwrap();
        let got = sunionstore_command(vec![b(b"dst"), b(b"dst"), b(b"other")], &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::Integer(3)));
        let members = member_set(smembers_command(b(b"dst"), &mut ctx).await);
        assert_eq!(members, [b(b"1"), b(b"2"), b(b"3")].into_iter().collect());
    }

    #[tokio::test]
    async fn wrong_type_is_rejected() {
        let (_server, mut ctx, _rx) = test_context().await;
        crate::cmd::string::set_command(b(b"s"), b(b"v"), vec![], &mut ctx).await.unwrap();
        assert_eq!(
            sadd_command(b(b"s"), vec![b(b"m")], &mut ctx).await.unwrap_err(),
            CommandError::WrongType
        );
        assert_eq!(
            sinter_command(vec![b(b"s")], &mut ctx).await.unwrap_err(),
            CommandError::WrongType
        );
    }
}
