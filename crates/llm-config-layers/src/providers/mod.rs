//! Configuration tiers
//!
//! Every source the resolver consults implements [`ConfigProvider`]. The
//! environment tier lives here together with the types the backend clients
//! share: the error taxonomy, the resolution result and the TTL cache.

pub mod cache;
pub mod env;
pub mod traits;

pub use cache::{CacheEntry, TtlCache};
pub use env::EnvSnapshot;
pub use traits::{
    ConfigProvider, ConfigSource, ProviderError, ProviderHealth, ProviderResult, ResolvedValue,
    TierHit,
};
