// src/core/commands/zset.rs

//! Sorted-set verbs. Range reads return a JSON array of base64-encoded
//! member keys (with the score as `val`), which is decoded here into the
//! flat RESP array shape; entries that fail to decode are skipped.

use super::Reply;
use crate::core::HustGateError;
use crate::core::backend::{BackendOp, BackendResponse, OpParams, ParamKey};
use crate::core::dispatch::Dispatcher;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::future::join_all;
use serde::Deserialize;

pub async fn zadd(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let table = &args[1];
    let pairs = &args[2..];
    if pairs.len() % 2 != 0 {
        return Err(HustGateError::SyntaxError);
    }
    for chunk in pairs.chunks(2) {
        parse_float(&chunk[0]).map_err(|_| HustGateError::NotAFloat)?;
    }

    let additions = pairs.chunks(2).map(|chunk| {
        let (score, member) = (&chunk[0], &chunk[1]);
        let params = OpParams::new()
            .with(ParamKey::Tb, table.clone())
            .with(ParamKey::Score, score.clone())
            .with(ParamKey::Key, member.clone());
        dispatcher.write_all(BackendOp::Zadd, member, params, None)
    });
    let added = join_all(additions)
        .await
        .iter()
        .filter(|response| response.is_ok() && response.version == 1)
        .count();
    Ok(Reply::Integer(added as i64))
}

pub async fn zscore(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let (table, member) = (&args[1], &args[2]);
    let params = OpParams::new()
        .with(ParamKey::Tb, table.clone())
        .with(ParamKey::Key, member.clone());
    let response = dispatcher.read_newest(BackendOp::Zscore, member, params).await;
    if response.is_ok() {
        Ok(Reply::Bulk(response.body))
    } else {
        Ok(Reply::Nil)
    }
}

/// Routed through the zadd endpoint with a sign parameter; the backend does
/// the arithmetic.
pub async fn zincrby(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let (table, member) = (&args[1], &args[3]);
    let (sign, magnitude) = match args[2].strip_prefix(b"-") {
        Some(rest) => ("-1", Bytes::copy_from_slice(rest)),
        None => ("1", args[2].clone()),
    };
    parse_float(&magnitude).map_err(|_| HustGateError::NotAFloat)?;

    let params = OpParams::new()
        .with(ParamKey::Tb, table.clone())
        .with(ParamKey::Score, magnitude)
        .with(ParamKey::Key, member.clone())
        .with(ParamKey::Opt, sign);
    let response = dispatcher.write_all(BackendOp::Zadd, member, params, None).await;
    if response.is_ok() {
        Ok(Reply::Bulk(response.body))
    } else {
        Ok(Reply::Bulk(Bytes::from_static(b"0")))
    }
}

pub async fn zrem(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let table = &args[1];
    let removals = args[2..].iter().map(|member| {
        let params = OpParams::new()
            .with(ParamKey::Tb, table.clone())
            .with(ParamKey::Key, member.clone());
        dispatcher.write_all(BackendOp::Zrem, member, params, None)
    });
    let removed = join_all(removals)
        .await
        .iter()
        .filter(|response| response.is_ok())
        .count();
    Ok(Reply::Integer(removed as i64))
}

/// `ZRANGE tb start end [WITHSCORES]`, translated to the backend's
/// rank-window endpoint as an offset/size pair.
pub async fn zrange(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let table = &args[1];
    let start = parse_int(&args[2])?;
    let end = parse_int(&args[3])?;
    if end < start {
        return Ok(Reply::Array(Vec::new()));
    }

    let withscores = match args.get(4) {
        None => false,
        Some(flag) if flag.eq_ignore_ascii_case(b"withscores") => true,
        Some(_) => return Err(HustGateError::SyntaxError),
    };

    let params = OpParams::new()
        .with(ParamKey::Tb, table.clone())
        .with(ParamKey::Offset, start.to_string())
        .with(ParamKey::Size, (end - start + 1).to_string())
        .with(ParamKey::Noval, if withscores { "false" } else { "true" });
    let response = dispatcher
        .read_first_ok(BackendOp::Zrangebyrank, table, params)
        .await;
    Ok(Reply::Array(decode_range_body(&response, withscores)))
}

/// `ZRANGEBYSCORE tb min max [WITHSCORES] [LIMIT offset count]`.
///
/// An open bound (`(` prefix) is adjusted by one whole unit before being
/// passed on. That is lossy for fractional scores; the backend's integer
/// score domain is what the adjustment is defined over.
pub async fn zrangebyscore(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let table = &args[1];
    let (min_open, min_raw) = strip_open_prefix(&args[2]);
    let (max_open, max_raw) = strip_open_prefix(&args[3]);
    let min = parse_float(min_raw).map_err(|_| HustGateError::RangeBoundNotAFloat)?;
    let max = parse_float(max_raw).map_err(|_| HustGateError::RangeBoundNotAFloat)?;
    if max < min {
        return Ok(Reply::Array(Vec::new()));
    }

    let mut params = OpParams::new()
        .with(ParamKey::Tb, table.clone())
        .with(ParamKey::Min, format_bound(min, min_open, 1.0))
        .with(ParamKey::Max, format_bound(max, max_open, -1.0));

    let mut withscores = false;
    let mut i = 4;
    while i < args.len() {
        let modifier = args[i].to_ascii_lowercase();
        match modifier.as_slice() {
            b"withscores" => {
                params.push(ParamKey::Noval, "false");
                withscores = true;
            }
            b"limit" => {
                if i + 2 >= args.len() {
                    return Err(HustGateError::SyntaxError);
                }
                parse_int(&args[i + 1])?;
                parse_int(&args[i + 2])?;
                params.push(ParamKey::Offset, args[i + 1].clone());
                params.push(ParamKey::Size, args[i + 2].clone());
                i += 2;
            }
            _ => return Err(HustGateError::SyntaxError),
        }
        i += 1;
    }

    let response = dispatcher
        .read_first_ok(BackendOp::Zrangebyscore, table, params)
        .await;
    Ok(Reply::Array(decode_range_body(&response, withscores)))
}

fn strip_open_prefix(raw: &Bytes) -> (bool, &[u8]) {
    match raw.strip_prefix(b"(") {
        Some(rest) => (true, rest),
        None => (false, raw),
    }
}

fn format_bound(value: f64, open: bool, adjustment: f64) -> String {
    let value = if open { value + adjustment } else { value };
    format!("{value:.6}")
}

fn parse_int(raw: &[u8]) -> Result<i64, HustGateError> {
    std::str::from_utf8(raw)
        .map_err(|_| HustGateError::NotAnInteger)?
        .parse()
        .map_err(|_| HustGateError::NotAnInteger)
}

fn parse_float(raw: &[u8]) -> Result<f64, std::num::ParseFloatError> {
    std::str::from_utf8(raw).unwrap_or("x").parse()
}

#[derive(Deserialize)]
struct RangeItem {
    key: String,
    #[serde(default)]
    val: Option<String>,
}

fn decode_range_body(response: &BackendResponse, withscores: bool) -> Vec<Bytes> {
    if !response.is_ok() {
        return Vec::new();
    }
    let Ok(items) = serde_json::from_slice::<Vec<RangeItem>>(&response.body) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(items.len() * if withscores { 2 } else { 1 });
    for item in items {
        let Ok(member) = BASE64.decode(&item.key) else {
            continue;
        };
        out.push(Bytes::from(member));
        if withscores && let Some(score) = item.val {
            out.push(Bytes::from(score));
        }
    }
    out
}
