use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::pattern::Pattern;
use crate::resp::RespValue;

///
/// Pub/Sub bus: exact-channel and pattern-channel subscriptions.
///
/// Registry mutation and broadcast iteration both happen under one mutex,
/// so subscribers never observe a half-updated registry. Delivery is a
/// non-blocking channel send; a subscriber that went away mid-delivery is
/// skipped silently.
///

type Sender = mpsc::UnboundedSender<RespValue>;

#[derive(Default)]
struct PatternEntry {
    pattern: Option<Pattern>,
    subscribers: HashMap<u64, Sender>,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<Bytes, HashMap<u64, Sender>>,
    patterns: HashMap<Bytes, PatternEntry>,
}

#[derive(Default)]
pub struct PubSub {
    inner: Mutex<Registry>,
}

impl PubSub {
    pub fn new() -> PubSub {
        PubSub::default()
    }

    /// Returns true when this client was not yet subscribed to `channel`.
    pub fn subscribe(&self, channel: Bytes, client: u64, sender: Sender) -> bool {
        let mut registry = self.inner.lock().unwrap();
        registry
            .channels
            .entry(channel)
            .or_default()
            .insert(client, sender)
            .is_none()
    }

    pub fn unsubscribe(&self, channel: &[u8], client: u64) -> bool {
        let mut registry = self.inner.lock().unwrap();
        let Some(subscribers) = registry.channels.get_mut(channel) else {
            return false;
        };
        let removed = subscribers.remove(&client).is_some();
        if subscribers.is_empty() {
            registry.channels.remove(channel);
        }
        removed
    }

    pub fn psubscribe(&self, spec: Bytes, pattern: Pattern, client: u64, sender: Sender) -> bool {
        let mut registry = self.inner.lock().unwrap();
        let entry = registry.patterns.entry(spec).or_default();
        entry.pattern = Some(pattern);
        entry.subscribers.insert(client, sender).is_none()
    }

    pub fn punsubscribe(&self, spec: &[u8], client: u64) -> bool {
        let mut registry = self.inner.lock().unwrap();
        let Some(entry) = registry.patterns.get_mut(spec) else {
            return false;
        };
        let removed = entry.subscribers.remove(&client).is_some();
        if entry.subscribers.is_empty() {
            registry.patterns.remove(spec);
        }
        removed
    }

    /// Deliver to every exact subscriber and every subscriber of a
    /// matching pattern; a client holding both kinds of subscription is
    /// reached once per subscription. Returns how many deliveries landed.
    pub fn publish(&self, channel: &[u8], message: &Bytes) -> usize {
        let registry = self.inner.lock().unwrap();
        let mut receivers = 0;

        if let Some(subscribers) = registry.channels.get(channel) {
            let payload = RespValue::array(vec![
                RespValue::bulk(&b"message"[..]),
                RespValue::bulk(Bytes::copy_from_slice(channel)),
                RespValue::bulk(message.clone()),
            ]);
            for sender in subscribers.values() {
                if sender.send(payload.clone()).is_ok() {
                    receivers += 1;
                }
            }
        }

        for (spec, entry) in registry.patterns.iter() {
            let matches = entry.pattern.as_ref().is_some_and(|p| p.matches(channel));
            if !matches {
                continue;
            }
            let payload = RespValue::array(vec![
                RespValue::bulk(&b"pmessage"[..]),
                RespValue::bulk(spec.clone()),
                RespValue::bulk(Bytes::copy_from_slice(channel)),
                RespValue::bulk(message.clone()),
            ]);
            for sender in entry.subscribers.values() {
                if sender.send(payload.clone()).is_ok() {
                    receivers += 1;
                }
            }
        }
        receivers
    }

    /// Channels with at least one subscriber, optionally filtered.
    pub fn channels(&self, filter: Option<&Pattern>) -> Vec<Bytes> {
        let registry = self.inner.lock().unwrap();
        registry
            .channels
            .keys()
            .filter(|ch| filter.map_or(true, |p| p.matches(ch)))
            .cloned()
            .collect()
    }

    pub fn numsub(&self, channels: &[Bytes]) -> Vec<(Bytes, usize)> {
        let registry = self.inner.lock().unwrap();
        channels
            .iter()
            .map(|ch| {
                let count = registry.channels.get(&ch[..]).map_or(0, HashMap::len);
                (ch.clone(), count)
            })
            .collect()
    }

    /// Number of distinct patterns with at least one subscriber.
    pub fn numpat(&self) -> usize {
        self.inner.lock().unwrap().patterns.len()
    }

    /// Disconnect cleanup: drop every subscription this client held.
    pub fn remove_client(&self, client: u64) {
        let mut registry = self.inner.lock().unwrap();
        registry.channels.retain(|_, subscribers| {
            subscribers.remove(&client);
            !subscribers.is_empty()
        });
        registry.patterns.retain(|_, entry| {
            entry.subscribers.remove(&client);
            !entry.subscribers.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &[u8]) -> Bytes {
        Bytes::copy_from_slice(s)
    }

    fn subscriber() -> (Sender, mpsc::UnboundedReceiver<RespValue>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn publish_reaches_exact_subscribers() {
        let bus = PubSub::new();
        let (tx, mut rx) = subscriber();
        assert!(bus.subscribe(b(b"ch"), 1, tx.clone()));
        assert!(!bus.subscribe(b(b"ch"), 1, tx));

        assert_eq!(bus.publish(b"ch", &b(b"hi")), 1);
        assert_eq!(bus.publish(b"other", &b(b"hi")), 0);

        let got = rx.try_recv().expect("delivered");
        assert_eq!(
            got,
            RespValue::array(vec![
                RespValue::bulk(&b"message"[..]),
                RespValue::bulk(&b"ch"[..]),
                RespValue::bulk(&b"hi"[..]),
            ])
        );
    }

    #[test]
    fn publish_reaches_pattern_subscribers() {
        let bus = PubSub::new();
        let (tx, mut rx) = subscriber();
        bus.psubscribe(b(b"news.*"), Pattern::parse(b"news.*").unwrap(), 7, tx);

        assert_eq!(bus.publish(b"news.tech", &b(b"x")), 1);
        let got = rx.try_recv().expect("delivered");
        assert_eq!(
            got,
            RespValue::array(vec![
                RespValue::bulk(&b"pmessage"[..]),
                RespValue::bulk(&b"news.*"[..]),
                RespValue::bulk(&b"news.tech"[..]),
                RespValue::bulk(&b"x"[..]),
            ])
        );
        assert_eq!(bus.publish(b"sports", &b(b"x")), 0);
    }

    #[test]
    fn client_with_both_kinds_counts_once_per_subscription() {
        let bus = PubSub::new();
        let (tx, mut rx) = subscriber();
        bus.subscribe(b(b"ch"), 1, tx.clone());
        bus.psubscribe(b(b"c*"), Pattern::parse(b"c*").unwrap(), 1, tx);

        assert_eq!(bus.publish(b"ch", &b(b"m")), 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dead_subscribers_are_skipped_silently() {
        let bus = PubSub::new();
        let (tx, rx) = subscriber();
        bus.subscribe(b(b"ch"), 1, tx);
        drop(rx);
        assert_eq!(bus.publish(b"ch", &b(b"m")), 0);
    }

    #[test]
    fn accounting_queries() {
        let bus = PubSub::new();
        let (tx1, _rx1) = subscriber();
        let (tx2, _rx2) = subscriber();
        bus.subscribe(b(b"a"), 1, tx1.clone());
        bus.subscribe(b(b"a"), 2, tx2);
        bus.subscribe(b(b"b"), 1, tx1.clone());
        bus.psubscribe(b(b"x*"), Pattern::parse(b"x*").unwrap(), 1, tx1);

        let mut active = bus.channels(None);
        active.sort();
        assert_eq!(active, vec![b(b"a"), b(b"b")]);

        let filtered = bus.channels(Some(&Pattern::parse(b"a").unwrap()));
        assert_eq!(filtered, vec![b(b"a")]);

        let counts = bus.numsub(&[b(b"a"), b(b"b"), b(b"ghost")]);
        assert_eq!(counts, vec![(b(b"a"), 2), (b(b"b"), 1), (b(b"ghost"), 0)]);

        assert_eq!(bus.numpat(), 1);
    }

    #[test]
    fn unsubscribe_and_disconnect_clean_up() {
        let bus = PubSub::new();
        let (tx, _rx) = subscriber();
        bus.subscribe(b(b"a"), 1, tx.clone());
        bus.subscribe(b(b"a"), 2, tx.clone());
        bus.psubscribe(b(b"p*"), Pattern::parse(b"p*").unwrap(), 2, tx);

        assert!(bus.unsubscribe(b"a", 1));
        assert!(!bus.unsubscribe(b"a", 1));
        assert_eq!(bus.numsub(&[b(b"a")]), vec![(b(b"a"), 1)]);

        bus.remove_client(2);
        assert!(bus.channels(None).is_empty());
        assert_eq!(bus.numpat(), 0);
    }
}
