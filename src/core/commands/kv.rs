// src/core/commands/kv.rs

//! Plain key/value verbs: `set` with its condition and TTL modifiers, the
//! read family, and multi-key `del`.

use super::Reply;
use crate::core::HustGateError;
use crate::core::backend::{BackendOp, OpParams, ParamKey};
use crate::core::dispatch::Dispatcher;
use bytes::Bytes;
use futures::future::join_all;

/// `SET key value [NX|XX] [EX seconds | PX milliseconds]`.
///
/// The condition flags are resolved against the backend with an existence
/// probe before the write goes out; an unsatisfied condition replies nil.
pub async fn set(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let key = &args[1];
    let mut params = OpParams::new().with(ParamKey::Key, key.clone());

    let mut i = 3;
    while i < args.len() {
        let modifier = args[i].to_ascii_lowercase();
        match modifier.as_slice() {
            b"nx" | b"xx" => {
                let exists_params = OpParams::new().with(ParamKey::Key, key.clone());
                let exists = dispatcher
                    .read_first_ok(BackendOp::Exists, key, exists_params)
                    .await
                    .is_ok();
                if (modifier.as_slice() == b"nx" && exists)
                    || (modifier.as_slice() == b"xx" && !exists)
                {
                    return Ok(Reply::Nil);
                }
            }
            b"ex" | b"px" => {
                let Some(raw) = args.get(i + 1) else {
                    return Err(HustGateError::SyntaxError);
                };
                let value: i64 = std::str::from_utf8(raw)
                    .map_err(|_| HustGateError::NotAnInteger)?
                    .parse()
                    .map_err(|_| HustGateError::NotAnInteger)?;
                let seconds = if modifier.as_slice() == b"px" {
                    // The backend's TTL granularity is whole seconds.
                    (value / 1000).max(1)
                } else {
                    value
                };
                params.push(ParamKey::Ttl, seconds.to_string());
                i += 1;
            }
            _ => return Err(HustGateError::SyntaxError),
        }
        i += 1;
    }

    let response = dispatcher
        .write_all(BackendOp::Put, key, params, Some(args[2].clone()))
        .await;
    if response.is_ok() {
        Ok(Reply::Simple("OK".into()))
    } else {
        Ok(Reply::Nil)
    }
}

pub async fn get(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let key = &args[1];
    let params = OpParams::new().with(ParamKey::Key, key.clone());
    let response = dispatcher.read_first_ok(BackendOp::Get, key, params).await;
    if response.is_ok() {
        Ok(Reply::Bulk(response.body))
    } else {
        Ok(Reply::Nil)
    }
}

/// Versioned read: both replicas are asked and the newest version wins.
pub async fn get2(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let key = &args[1];
    let params = OpParams::new().with(ParamKey::Key, key.clone());
    let response = dispatcher.read_newest(BackendOp::Get2, key, params).await;
    if response.is_ok() {
        Ok(Reply::Bulk(response.body))
    } else {
        Ok(Reply::Nil)
    }
}

pub async fn exists(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let key = &args[1];
    let params = OpParams::new().with(ParamKey::Key, key.clone());
    let response = dispatcher.read_first_ok(BackendOp::Exists, key, params).await;
    Ok(Reply::Integer(response.is_ok() as i64))
}

pub async fn del(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let deletions = args[1..].iter().map(|key| {
        let params = OpParams::new().with(ParamKey::Key, key.clone());
        dispatcher.write_all(BackendOp::Del, key, params, None)
    });
    let deleted = join_all(deletions)
        .await
        .iter()
        .filter(|response| response.is_ok())
        .count();
    Ok(Reply::Integer(deleted as i64))
}

pub async fn strlen(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let key = &args[1];
    let params = OpParams::new().with(ParamKey::Key, key.clone());
    let response = dispatcher.read_first_ok(BackendOp::Get, key, params).await;
    let len = if response.is_ok() {
        response.body.len() as i64
    } else {
        0
    };
    Ok(Reply::Integer(len))
}
