// src/core/commands/set.rs

//! Set verbs. Members route by their own key; a version of 1 on the backend
//! reply marks a member that did not exist before.

use super::Reply;
use crate::core::HustGateError;
use crate::core::backend::{BackendOp, OpParams, ParamKey};
use crate::core::dispatch::Dispatcher;
use bytes::Bytes;
use futures::future::join_all;

pub async fn sadd(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let table = &args[1];
    let additions = args[2..].iter().map(|member| {
        let params = OpParams::new()
            .with(ParamKey::Tb, table.clone())
            .with(ParamKey::Key, member.clone());
        dispatcher.write_all(BackendOp::Sadd, member, params, None)
    });
    let added = join_all(additions)
        .await
        .iter()
        .filter(|response| response.is_ok() && response.version == 1)
        .count();
    Ok(Reply::Integer(added as i64))
}

pub async fn sismember(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let (table, member) = (&args[1], &args[2]);
    let params = OpParams::new()
        .with(ParamKey::Tb, table.clone())
        .with(ParamKey::Key, member.clone());
    let response = dispatcher
        .read_first_ok(BackendOp::Sismember, member, params)
        .await;
    Ok(Reply::Integer(response.is_ok() as i64))
}

pub async fn srem(dispatcher: &Dispatcher, args: &[Bytes]) -> Result<Reply, HustGateError> {
    let table = &args[1];
    let removals = args[2..].iter().map(|member| {
        let params = OpParams::new()
            .with(ParamKey::Tb, table.clone())
            .with(ParamKey::Key, member.clone());
        dispatcher.write_all(BackendOp::Srem, member, params, None)
    });
    let removed = join_all(removals)
        .await
        .iter()
        .filter(|response| response.is_ok())
        .count();
    Ok(Reply::Integer(removed as i64))
}
