use mc_pool::PoolError;
use mc_proto::ServerError;

/// Everything a façade call can fail with: a pool/transport problem, or the server answering with
/// one of the three protocol error keywords (§4.1.4). A cache miss is not an error, see
/// [`GetResult`](crate::GetResult).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("server rejected the command: {0}")]
    Protocol(#[from] ServerError),
}
