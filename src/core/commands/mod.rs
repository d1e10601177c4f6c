// src/core/commands/mod.rs

//! The RESP-facing command layer: the verb table with its arity bounds, and
//! the per-verb handlers that translate arguments into dispatcher calls and
//! backend replies into wire shapes.

mod generic;
mod hash;
mod kv;
mod reply;
mod set;
mod zset;

pub use reply::Reply;

use crate::core::HustGateError;
use crate::core::dispatch::Dispatcher;
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One entry of the verb table: arity bounds plus the handler selector.
/// `max_args == 0` means unbounded, as in `DEL key [key ...]`.
pub struct CmdSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    kind: CommandKind,
}

#[derive(Debug, Clone, Copy)]
enum CommandKind {
    Set,
    Get,
    Get2,
    Exists,
    Del,
    Strlen,
    Hset,
    Hget,
    Hdel,
    Hexists,
    Hincrby,
    Hlen,
    Sadd,
    Sismember,
    Srem,
    Zadd,
    Zscore,
    Zincrby,
    Zrem,
    Zrange,
    Zrangebyscore,
    Ping,
    Echo,
}

fn spec(name: &'static str, min: usize, max: usize, kind: CommandKind) -> (&'static str, CmdSpec) {
    (
        name,
        CmdSpec {
            name,
            min_args: min,
            max_args: max,
            kind,
        },
    )
}

static COMMANDS: Lazy<HashMap<&'static str, CmdSpec>> = Lazy::new(|| {
    HashMap::from([
        spec("set", 3, 0, CommandKind::Set),
        spec("get", 2, 2, CommandKind::Get),
        spec("get2", 2, 2, CommandKind::Get2),
        spec("exists", 2, 2, CommandKind::Exists),
        spec("del", 2, 0, CommandKind::Del),
        spec("strlen", 2, 2, CommandKind::Strlen),
        spec("hset", 4, 4, CommandKind::Hset),
        spec("hget", 3, 3, CommandKind::Hget),
        spec("hdel", 3, 0, CommandKind::Hdel),
        spec("hexists", 3, 3, CommandKind::Hexists),
        spec("hincrby", 4, 4, CommandKind::Hincrby),
        spec("hlen", 2, 2, CommandKind::Hlen),
        spec("sadd", 3, 0, CommandKind::Sadd),
        spec("sismember", 3, 3, CommandKind::Sismember),
        spec("srem", 3, 0, CommandKind::Srem),
        spec("zadd", 4, 0, CommandKind::Zadd),
        spec("zscore", 3, 3, CommandKind::Zscore),
        spec("zincrby", 4, 4, CommandKind::Zincrby),
        spec("zrem", 3, 0, CommandKind::Zrem),
        spec("zrange", 4, 5, CommandKind::Zrange),
        spec("zrangebyscore", 4, 0, CommandKind::Zrangebyscore),
        spec("ping", 1, 1, CommandKind::Ping),
        spec("echo", 2, 2, CommandKind::Echo),
    ])
});

/// Executes one client command against the dispatcher. Command-level errors
/// come back as `Reply::Error`; the connection survives all of them.
pub async fn execute(dispatcher: &Dispatcher, args: &[Bytes]) -> Reply {
    let Some(verb_raw) = args.first() else {
        return Reply::Error("ERR empty command".into());
    };
    let verb = String::from_utf8_lossy(verb_raw).to_lowercase();

    let Some(spec) = COMMANDS.get(verb.as_str()) else {
        let verb = String::from_utf8_lossy(verb_raw).into_owned();
        return Reply::Error(HustGateError::UnknownCommand(verb).to_resp_error());
    };

    let argc = args.len();
    if argc < spec.min_args || (spec.max_args > 0 && argc > spec.max_args) {
        return Reply::Error(
            HustGateError::WrongArgumentCount(spec.name.to_string()).to_resp_error(),
        );
    }

    let result: Result<Reply, HustGateError> = match spec.kind {
        CommandKind::Set => kv::set(dispatcher, args).await,
        CommandKind::Get => kv::get(dispatcher, args).await,
        CommandKind::Get2 => kv::get2(dispatcher, args).await,
        CommandKind::Exists => kv::exists(dispatcher, args).await,
        CommandKind::Del => kv::del(dispatcher, args).await,
        CommandKind::Strlen => kv::strlen(dispatcher, args).await,
        CommandKind::Hset => hash::hset(dispatcher, args).await,
        CommandKind::Hget => hash::hget(dispatcher, args).await,
        CommandKind::Hdel => hash::hdel(dispatcher, args).await,
        CommandKind::Hexists => hash::hexists(dispatcher, args).await,
        CommandKind::Hincrby => hash::hincrby(dispatcher, args).await,
        CommandKind::Hlen => hash::hlen(dispatcher, args).await,
        CommandKind::Sadd => set::sadd(dispatcher, args).await,
        CommandKind::Sismember => set::sismember(dispatcher, args).await,
        CommandKind::Srem => set::srem(dispatcher, args).await,
        CommandKind::Zadd => zset::zadd(dispatcher, args).await,
        CommandKind::Zscore => zset::zscore(dispatcher, args).await,
        CommandKind::Zincrby => zset::zincrby(dispatcher, args).await,
        CommandKind::Zrem => zset::zrem(dispatcher, args).await,
        CommandKind::Zrange => zset::zrange(dispatcher, args).await,
        CommandKind::Zrangebyscore => zset::zrangebyscore(dispatcher, args).await,
        CommandKind::Ping => generic::ping(),
        CommandKind::Echo => generic::echo(args),
    };

    result.unwrap_or_else(|e| Reply::Error(e.to_resp_error()))
}
