//! countgate-store: key-value store clients for countgate.
//!
//! The gateway only ever talks to a [`KvStore`] trait object. Two backends
//! implement it:
//!
//! - [`RedisStore`]: the production backend. One auto-reconnecting
//!   multiplexed connection shared by every request.
//! - [`EmbeddedStore`]: a [redb](https://docs.rs/redb) database, on disk or
//!   in memory, for local runs and tests.
//!
//! Both honour the atomic-increment contract: `incr_by` on an absent key
//! creates it at `delta`, and concurrent increments never lose updates.

pub mod embedded;
pub mod error;
pub mod redis_store;
pub mod store;
pub mod tables;

use std::sync::Arc;

use countgate_core::StoreUrl;
use tracing::info;

pub use embedded::EmbeddedStore;
pub use error::{StoreError, StoreResult};
pub use redis_store::{ClientOptions, RedisStore};
pub use store::{KvStore, ServerInfo, StoreFuture};

/// Build the store described by `url`.
pub async fn connect(url: &StoreUrl, opts: &ClientOptions) -> StoreResult<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match url {
        StoreUrl::Redis { .. } => Arc::new(RedisStore::connect(url, opts).await?),
        StoreUrl::Memory => Arc::new(EmbeddedStore::open_in_memory()?),
        StoreUrl::File { path } => Arc::new(EmbeddedStore::open(std::path::Path::new(path))?),
    };
    info!(store = %url, backend = store.backend(), "store connected");
    Ok(store)
}
