use bytes::Bytes;

use crate::cmd::{CmdResult, CommandContext, CommandError};
use crate::pattern::Pattern;
use crate::resp::RespValue;

///
/// Pub/Sub commands. Subscribe-family handlers answer through the
/// connection's outbound queue (one confirmation per channel), so they
/// return no single reply value.
///

fn confirmation(kind: &'static str, subject: RespValue, count: usize) -> RespValue {
    RespValue::array(vec![
        RespValue::bulk(Bytes::from_static(kind.as_bytes())),
        subject,
        RespValue::Integer(count as i64),
    ])
}

pub(crate) async fn publish_command(channel: Bytes, message: Bytes, ctx: &mut CommandContext) -> CmdResult {
    let receivers = ctx.server.pubsub.publish(&channel, &message);
    Ok(Some(RespValue::Integer(receivers as i64)))
}

pub(crate) async fn subscribe_command(channels: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    for channel in channels {
        ctx.server
            .pubsub
            .subscribe(channel.clone(), ctx.client.id(), ctx.client.sender());
        ctx.channels.insert(channel.clone());
        let reply = confirmation("subscribe", RespValue::bulk(channel), ctx.subscription_count());
        ctx.push(reply);
    }
    ctx.client.set_subscriptions(ctx.channels.len(), ctx.patterns.len());
    Ok(None)
}

/// Without arguments every exact-channel subscription goes; the reply
/// for a bare UNSUBSCRIBE with nothing subscribed is a single nil
/// confirmation.
pub(crate) async fn unsubscribe_command(channels: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let targets: Vec<Bytes> = if channels.is_empty() {
        ctx.channels.iter().cloned().collect()
    } else {
        channels
    };
    if targets.is_empty() {
        ctx.push(confirmation("unsubscribe", RespValue::null_bulk(), ctx.subscription_count()));
        return Ok(None);
    }
    for channel in targets {
        ctx.server.pubsub.unsubscribe(&channel, ctx.client.id());
        ctx.channels.remove(&channel);
        let reply = confirmation("unsubscribe", RespValue::bulk(channel), ctx.subscription_count());
        ctx.push(reply);
    }
    ctx.client.set_subscriptions(ctx.channels.len(), ctx.patterns.len());
    Ok(None)
}

pub(crate) async fn psubscribe_command(patterns: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    for spec in patterns {
        let pattern = Pattern::parse(&spec)?;
        ctx.server
            .pubsub
            .psubscribe(spec.clone(), pattern, ctx.client.id(), ctx.client.sender());
        ctx.patterns.insert(spec.clone());
        let reply = confirmation("psubscribe", RespValue::bulk(spec), ctx.subscription_count());
        ctx.push(reply);
    }
    ctx.client.set_subscriptions(ctx.channels.len(), ctx.patterns.len());
    Ok(None)
}

pub(crate) async fn punsubscribe_command(patterns: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    let targets: Vec<Bytes> = if patterns.is_empty() {
        ctx.patterns.iter().cloned().collect()
    } else {
        patterns
    };
    if targets.is_empty() {
        ctx.push(confirmation("punsubscribe", RespValue::null_bulk(), ctx.subscription_count()));
        return Ok(None);
    }
    for spec in targets {
        ctx.server.pubsub.punsubscribe(&spec, ctx.client.id());
        ctx.patterns.remove(&spec);
        let reply = confirmation("punsubscribe", RespValue::bulk(spec), ctx.subscription_count());
        ctx.push(reply);
    }
    ctx.client.set_subscriptions(ctx.channels.len(), ctx.patterns.len());
    Ok(None)
}

/// PUBSUB CHANNELS [pattern] | NUMSUB [channel ...] | NUMPAT
pub(crate) async fn pubsub_command(args: Vec<Bytes>, ctx: &mut CommandContext) -> CmdResult {
    match args[0].to_ascii_uppercase().as_slice() {
        b"CHANNELS" => {
            let filter = match args.get(1) {
                Some(spec) => Some(Pattern::parse(spec)?),
                None => None,
            };
            let channels = ctx
                .server
                .pubsub
                .channels(filter.as_ref())
                .into_iter()
                .map(RespValue::bulk)
                .collect();
            Ok(Some(RespValue::array(channels)))
        }
        b"NUMSUB" => {
            let mut items = Vec::with_capacity((args.len() - 1) * 2);
            for (channel, count) in ctx.server.pubsub.numsub(&args[1..]) {
                items.push(RespValue::bulk(channel));
                items.push(RespValue::Integer(count as i64));
            }
            Ok(Some(RespValue::array(items)))
        }
        b"NUMPAT" => Ok(Some(RespValue::Integer(ctx.server.pubsub.numpat() as i64))),
        _ => Err(CommandError::UnknownSubcommand(
            String::from_utf8_lossy(&args[0]).to_lowercase(),
        )),
    }
}
