// src/core/commands/generic.rs

use super::Reply;
use crate::core::HustGateError;
use bytes::Bytes;

pub fn ping() -> Result<Reply, HustGateError> {
    Ok(Reply::Simple("PONG".into()))
}

pub fn echo(args: &[Bytes]) -> Result<Reply, HustGateError> {
    Ok(Reply::Bulk(args[1].clone()))
}
