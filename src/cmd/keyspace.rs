use bytes::Bytes;

use crate::cmd::{CmdResult, CommandContext, CommandError};
use crate::pattern::Pattern;
use crate::resp::RespValue;

///
/// Keyspace commands.
///

pub(crate) async fn keys_command(pattern: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let pattern = Pattern::parse(&pattern)?;
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let keys = db
        .keys_matching(&pattern)
        .into_iter()
        .map(RespValue::bulk)
        .collect();
    Ok(Some(RespValue::array(keys)))
}

/// Counts existing keys across the arguments, one per mention.
pub(crate) async fn exists_command(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let count = keys.iter().filter(|key| db.contains_key(key)).count();
    Ok(Some(RespValue::Integer(count as i64)))
}

pub(crate) async fn del_command(keys: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    let mut removed = 0;
    for key in &keys {
        if db.remove(key).is_some() {
            removed += 1;
        }
    }
    if removed > 0 {
        db.signal_modified();
    }
    Ok(Some(RespValue::Integer(removed)))
}

pub(crate) async fn type_command(key: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let name = db.lookup(&key).map_or("none", |obj| obj.type_name());
    Ok(Some(RespValue::simple(name)))
}

pub(crate) async fn rename_command(src: Bytes, dst: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    if !db.rename(&src, dst) {
        return Err(CommandError::NoSuchKey);
    }
    db.signal_modified();
    Ok(Some(RespValue::ok()))
}

/// Refuses (answers 0) when the destination exists; renaming a key onto
/// itself therefore also answers 0.
pub(crate) async fn renamenx_command(src: Bytes, dst: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    if !db.contains_key(&src) {
        return Err(CommandError::NoSuchKey);
    }
    if db.contains_key(&dst) {
        return Ok(Some(RespValue::Integer(0)));
    }
    db.rename(&src, dst);
    db.signal_modified();
    Ok(Some(RespValue::Integer(1)))
}

pub(crate) async fn dbsize_command(ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    Ok(Some(RespValue::Integer(db.len() as i64)))
}

pub(crate) async fn randomkey_command(ctx: &mut CommandContext) -> CmdResult {
    let dbs = ctx.server.dbs.read().await;
    let db = &dbs[ctx.db_index()];
    let reply = db.random_key().map_or_else(RespValue::null_bulk, RespValue::bulk);
    Ok(Some(reply))
}

pub(crate) async fn flushdb_command(ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    let db = &mut dbs[ctx.client.db_index()];
    db.flush();
    db.signal_modified();
    Ok(Some(RespValue::ok()))
}

pub(crate) async fn flushall_command(ctx: &mut CommandContext) -> CmdResult {
    let mut dbs = ctx.server.dbs.write().await;
    for db in dbs.iter_mut() {
        db.flush();
        db.signal_modified();
    }
    Ok(Some(RespValue::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::string::set_command;
    use crate::cmd::testing::test_context;

    fn b(s: &[u8]) -> Bytes {
        Bytes::copy_from_slice(s)
    }

    #[tokio::test]
    async fn keys_filters_by_pattern_and_rejects_glob_grammar() {
        let (_server, mut ctx, _rx) = test_context().await;
        for key in [&b"user:1"[..], b"user:2", b"session:1"] {
            set_command(b(key), b(b"v"), vec![], &mut ctx).await.unwrap();
        }
        let Some(RespValue::Array(Some(items))) =
            keys_command(b(b"user:*"), &mut ctx).await.unwrap()
        else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 2);

        let err = keys_command(b(b"h[ae]llo"), &mut ctx).await.unwrap_err();
        assert!(matches!(err, CommandError::PatternNotImplemented(_)));
        assert_eq!(err.code(), "500");
    }

    #[tokio::test]
    async fn exists_counts_every_mention() {
        let (_server, mut ctx, _rx) = test_context().await;
        set_command(b(b"a"), b(b"1"), vec![], &mut ctx).await.unwrap();
        let got = exists_command(vec![b(b"a"), b(b"a"), b(b"ghost")], &mut ctx).await.unwrap();
        assert_eq!(got, Some(RespValue::Integer(2)));
    }

    #[tokio::test]
    async fn del_scenario() {
        let (_server, mut ctx, _rx) = test_context().await;
        set_command(b(b"foo"), b(b"bar"), vec![], &mut ctx).await.unwrap();
        assert_eq!(
            del_command(vec![b(b"foo"), b(b"nope")], &mut ctx).await.unwrap(),
            Some(RespValue::Integer(1))
        );
        assert_eq!(
            crate::cmd::string::get_command(b(b"foo"), &mut ctx).await.unwrap(),
            Some(RespValue::null_bulk())
        );
    }

    #[tokio::test]
    async fn type_reports_each_kind() {
        let (_server, mut ctx, _rx) = test_context().await;
        set_command(b(b"s"), b(b"v"), vec![], &mut ctx).await.unwrap();
        crate::cmd::list::rpush_command(b(b"l"), vec![b(b"x")], &mut ctx).await.unwrap();
        crate::cmd::set::sadd_command(b(b"st"), vec![b(b"m")], &mut ctx).await.unwrap();
        crate::cmd::hash::hset_command(b(b"h"), b(b"f"), b(b"v"), &mut ctx).await.unwrap();

        for (key, kind) in [(&b"s"[..], "string"), (b"l", "list"), (b"st", "set"), (b"h", "hash")] {
            assert_eq!(
                type_command(b(key), &mut ctx).await.unwrap(),
                Some(RespValue::simple(kind))
            );
        }
        assert_eq!(type_command(b(b"none"), &mut ctx).await.unwrap(), Some(RespValue::simple("none")));
    }

    #[tokio::test]
    async fn rename_and_renamenx() {
        let (_server, mut ctx, _rx) = test_context().await;
        assert_eq!(
            rename_command(b(b"ghost"), b(b"x"), &mut ctx).await.unwrap_err(),
            CommandError::NoSuchKey
        );
        set_command(b(b"a"), b(b"1"), vec![], &mut ctx).await.unwrap();
        set_command(b(b"b"), b(b"2"), vec![], &mut ctx).await.unwrap();

        // rename onto itself succeeds and changes nothing
        assert_eq!(rename_command(b(b"a"), b(b"a"), &mut ctx).await.unwrap(), Some(RespValue::ok()));

        assert_eq!(
            renamenx_command(b(b"a"), b(b"b"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(0))
        );
        assert_eq!(
            renamenx_command(b(b"a"), b(b"c"), &mut ctx).await.unwrap(),
            Some(RespValue::Integer(1))
        );
        assert_eq!(
            crate::cmd::string::get_command(b(b"c"), &mut ctx).await.unwrap(),
            Some(RespValue::bulk(&b"1"[..]))
        );
    }

    #[tokio::test]
    async fn dbsize_randomkey_flush() {
        let (_server, mut ctx, _rx) = test_context().await;
        assert_eq!(dbsize_command(&mut ctx).await.unwrap(), Some(RespValue::Integer(0)));
        assert_eq!(randomkey_command(&mut ctx).await.unwrap(), Some(RespValue::null_bulk()));

        set_command(b(b"only"), b(b"v"), vec![], &mut ctx).await.unwrap();
        assert_eq!(dbsize_command(&mut ctx).await.unwrap(), Some(RespValue::Integer(1)));
        assert_eq!(
            randomkey_command(&mut ctx).await.unwrap(),
            Some(RespValue::bulk(&b"only"[..]))
        );

        flushdb_command(&mut ctx).await.unwrap();
        assert_eq!(dbsize_command(&mut ctx).await.unwrap(), Some(RespValue::Integer(0)));
    }

    #[tokio::test]
    async fn flushall_clears_every_database() {
        let (server, mut ctx, _rx) = test_context().await;
        set_command(b(b"k0"), b(b"v"), vec![], &mut ctx).await.unwrap();
        ctx.client.set_db_index(7);
        set_command(b(b"k7"), b(b"v"), vec![], &mut ctx).await.unwrap();

        flushall_command(&mut ctx).await.unwrap();
        let dbs = server.server.dbs.read().await;
        assert!(dbs[0].is_empty());
        assert!(dbs[7].is_empty());
    }
}
