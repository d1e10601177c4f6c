// src/core/commands/hash.rs

//! Hash-table verbs. Fields route by their own key, not by the table name,
//! so one table's fields spread across slots; `hlen` therefore sums a
//! scatter over every peer group.

use super::Reply;
use crate::core::HustGateError;
use crate::core::backend::{BackendOp, OpParams, ParamKey};
use crate::core::dispatch::Dispatcher;
use bytes::Bytes;
use futures::future::join_all;

pub async fn hset(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let (table, key, value) = (&args[1], &args[2], &args[3]);
    let params = OpParams::new()
        .with(ParamKey::Tb, table.clone())
        .with(ParamKey::Key, key.clone());
    let response = dispatcher
        .write_all(BackendOp::Hset, key, params, Some(value.clone()))
        .await;
    // Version 1 marks a freshly created field.
    let created = response.is_ok() && response.version == 1;
    Ok(Reply::Integer(created as i64))
}

pub async fn hget(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let (table, key) = (&args[1], &args[2]);
    let params = OpParams::new()
        .with(ParamKey::Tb, table.clone())
        .with(ParamKey::Key, key.clone());
    let response = dispatcher.read_newest(BackendOp::Hget, key, params).await;
    if response.is_ok() {
        Ok(Reply::Bulk(response.body))
    } else {
        Ok(Reply::Nil)
    }
}

pub async fn hdel(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let table = &args[1];
    let deletions = args[2..].iter().map(|key| {
        let params = OpParams::new()
            .with(ParamKey::Tb, table.clone())
            .with(ParamKey::Key, key.clone());
        dispatcher.write_all(BackendOp::Hdel, key, params, None)
    });
    let deleted = join_all(deletions)
        .await
        .iter()
        .filter(|response| response.is_ok())
        .count();
    Ok(Reply::Integer(deleted as i64))
}

pub async fn hexists(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let (table, key) = (&args[1], &args[2]);
    let params = OpParams::new()
        .with(ParamKey::Tb, table.clone())
        .with(ParamKey::Key, key.clone());
    let response = dispatcher
        .read_first_ok(BackendOp::Hexists, key, params)
        .await;
    Ok(Reply::Integer(response.is_ok() as i64))
}

/// `HINCRBY` is coordinated, not fanned out: the chosen backend receives the
/// sibling's host and performs its own sync, because a replayed increment
/// would not be idempotent.
pub async fn hincrby(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let (table, key, delta) = (&args[1], &args[2], &args[3]);
    std::str::from_utf8(delta)
        .map_err(|_| HustGateError::HashValueNotAnInteger)?
        .parse::<i64>()
        .map_err(|_| HustGateError::HashValueNotAnInteger)?;

    let params = OpParams::new()
        .with(ParamKey::Tb, table.clone())
        .with(ParamKey::Key, key.clone())
        .with(ParamKey::Val, delta.clone());
    let response = dispatcher.coord_write(BackendOp::Hincrby, key, params).await;
    if response.is_ok() {
        Ok(Reply::Bulk(response.body))
    } else {
        Ok(Reply::Bulk(Bytes::from_static(b"0")))
    }
}

pub async fn hlen(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let params = OpParams::new().with(ParamKey::Tb, args[1].clone());
    let response = dispatcher.stat_scatter(BackendOp::Stat, params).await;
    let mut len = 0;
    if response.is_ok()
        && let Ok(total) = std::str::from_utf8(&response.body).unwrap_or("0").parse::<i64>()
        && total != -1
    {
        len = total;
    }
    Ok(Reply::Integer(len))
}
