//! Typed `get`/`set` façade.
//!
//! `Client` is a thin wrapper: [`mc_pool::Pool`] and the [`mc_proto`] codec do all the real work.
//! This crate only renames operations into the shape described in §6 of the design and collapses
//! the codec's outcome types into a result a caller doesn't need to pattern-match against
//! `mc-proto` internals to use.

mod error;

use std::sync::Arc;
use std::time::Duration;

pub use mc_core::Context;
pub use mc_pool::PoolConfig;
use mc_pool::Pool;
use mc_proto::{GetMessage, GetOutcome, SetMessage, SetOutcome};

pub use error::ClientError;

/// Result of a `get`: a cache miss is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    Hit { value: Vec<u8>, flags: u16 },
    Miss,
}

/// A memcached client: a pool of pipelined connections plus typed `get`/`set` operations.
#[derive(Clone)]
pub struct Client {
    pool: Pool,
}

impl Client {
    /// Opens a pool to `addr` (dialing `config.min` connections eagerly) and wraps it in the
    /// `get`/`set` façade.
    pub async fn connect(addr: impl AsRef<str>, config: PoolConfig) -> std::io::Result<Self> {
        Ok(Self {
            pool: Pool::open(addr, config).await?,
        })
    }

    pub async fn get(&self, ctx: &Context, key: impl Into<String>) -> Result<GetResult, ClientError> {
        let msg = self.pool.call(ctx, GetMessage::new(key)).await?;
        Ok(match outcome_of(&msg) {
            GetOutcome::Miss => GetResult::Miss,
            GetOutcome::Value { flags, payload } => GetResult::Hit {
                value: payload.clone(),
                flags: *flags,
            },
            GetOutcome::Error(err) => return Err(ClientError::Protocol(err.clone())),
        })
    }

    pub async fn set(
        &self,
        ctx: &Context,
        key: impl Into<String>,
        flags: u16,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), ClientError> {
        let msg = self.pool.call(ctx, SetMessage::new(key, flags, ttl, value)).await?;
        match set_outcome_of(&msg) {
            SetOutcome::Stored => Ok(()),
            SetOutcome::Error(err) => Err(ClientError::Protocol(err.clone())),
        }
    }

    /// Closes every pooled connection and forbids further growth.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn outcome_of(msg: &Arc<GetMessage>) -> &GetOutcome {
    msg.outcome()
        .expect("mc-pool only returns a message from `call` once its response has completed")
}

fn set_outcome_of(msg: &Arc<SetMessage>) -> &SetOutcome {
    msg.outcome()
        .expect("mc-pool only returns a message from `call` once its response has completed")
}
