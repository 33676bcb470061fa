use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

///
/// Redis Objects.
///
/// A key holds exactly one of four kinds. Strings double as counters for
/// INCR/DECR by storing the decimal ASCII form. Lists keep insertion order
/// and allow duplicates; sets and hashes are unordered.
///

#[derive(Debug, Clone, PartialEq)]
pub enum RedisObject {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
}

impl RedisObject {
    /// type name as reported by TYPE and used in the dump file
    pub fn type_name(&self) -> &'static str {
        match self {
            RedisObject::String(_) => "string",
            RedisObject::List(_) => "list",
            RedisObject::Set(_) => "set",
            RedisObject::Hash(_) => "hash",
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, RedisObject::String(_))
    }

    pub fn string(&self) -> Option<&Bytes> {
        match self {
            RedisObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&VecDeque<Bytes>> {
        match self {
            RedisObject::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn list_mut(&mut self) -> Option<&mut VecDeque<Bytes>> {
        match self {
            RedisObject::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn set(&self) -> Option<&HashSet<Bytes>> {
        match self {
            RedisObject::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn set_mut(&mut self) -> Option<&mut HashSet<Bytes>> {
        match self {
            RedisObject::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn hash(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match self {
            RedisObject::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn hash_mut(&mut self) -> Option<&mut HashMap<Bytes, Bytes>> {
        match self {
            RedisObject::Hash(h) => Some(h),
            _ => None,
        }
    }
}

/// Map a possibly negative index onto `0..len`. `-1` is the last element.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let at = if index < 0 { len + index } else { index };
    if at < 0 || at >= len {
        None
    } else {
        Some(at as usize)
    }
}

/// Map a `(start, stop)` pair onto an inclusive `0..len` window, clamping
/// out-of-range ends the way LRANGE and GETRANGE do. `None` means the
/// window is empty.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Union of any number of member sets.
pub fn set_union(sets: &[&HashSet<Bytes>]) -> HashSet<Bytes> {
    let mut out = HashSet::new();
    for set in sets {
        out.extend(set.iter().cloned());
    }
    out
}

/// Intersection; empty when no sets are given.
pub fn set_inter(sets: &[&HashSet<Bytes>]) -> HashSet<Bytes> {
    let Some((first, rest)) = sets.split_first() else {
        return HashSet::new();
    };
    first
        .iter()
        .filter(|member| rest.iter().all(|s| s.contains(*member)))
        .cloned()
        .collect()
}

/// Members of `first` absent from every set in `rest`.
pub fn set_diff(first: &HashSet<Bytes>, rest: &[&HashSet<Bytes>]) -> HashSet<Bytes> {
    first
        .iter()
        .filter(|member| !rest.iter().any(|s| s.contains(*member)))
        .cloned()
        .collect()
}

///
/// Snapshot form. Every stored value serializes as a `{type, value}`
/// record; binary-safe byte sequences travel base64-encoded so the dump
/// stays valid JSON no matter what bytes the keyspace holds.
///

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DumpObject {
    String(String),
    List(Vec<String>),
    Set(Vec<String>),
    Hash(BTreeMap<String, String>),
}

pub fn encode_b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_b64(text: &str) -> Result<Bytes, base64::DecodeError> {
    BASE64.decode(text).map(Bytes::from)
}

impl DumpObject {
    pub fn from_obj(obj: &RedisObject) -> DumpObject {
        match obj {
            RedisObject::String(s) => DumpObject::String(encode_b64(s)),
            RedisObject::List(l) => DumpObject::List(l.iter().map(|v| encode_b64(v)).collect()),
            RedisObject::Set(s) => DumpObject::Set(s.iter().map(|v| encode_b64(v)).collect()),
            RedisObject::Hash(h) => DumpObject::Hash(
                h.iter().map(|(f, v)| (encode_b64(f), encode_b64(v))).collect(),
            ),
        }
    }

    pub fn into_obj(self) -> Result<RedisObject, base64::DecodeError> {
        Ok(match self {
            DumpObject::String(s) => RedisObject::String(decode_b64(&s)?),
            DumpObject::List(l) => {
                RedisObject::List(l.iter().map(|v| decode_b64(v)).collect::<Result<_, _>>()?)
            }
            DumpObject::Set(s) => {
                RedisObject::Set(s.iter().map(|v| decode_b64(v)).collect::<Result<_, _>>()?)
            }
            DumpObject::Hash(h) => RedisObject::Hash(
                h.iter()
                    .map(|(f, v)| Ok((decode_b64(f)?, decode_b64(v)?)))
                    .collect::<Result<_, base64::DecodeError>>()?,
            ),
        })
    }
}
