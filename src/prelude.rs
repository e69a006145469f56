pub use crate::builder::{CacheBuilder, CacheConfig};
pub use crate::dao::{
    CachedHitsDao, CachedRulesDao, DaoError, HitsLoader, HitsQuery, Page, RuleSet, RulesLoader,
};
pub use crate::error::{ConfigError, InvariantError};
pub use crate::firewall::{
    Attributes, Destination, DestinationCache, Filter, Hit, Ip, IpCache, ParseError, Rule,
    Service, ServiceCache, Source, SourceCache,
};
pub use crate::hash::{DefaultStrategy, HashStrategy, IdentityStrategy, IntArrayStrategy};
pub use crate::store::bucket::BucketHashCache;
pub use crate::store::heavy::{HeavyCacheMetrics, HeavySynchronizedHashCache};
pub use crate::store::open_addressing::IntOpenAddressingHashCache;
pub use crate::store::synchronized::{
    EmptyCache, SynchronizedBucketHashCache, SynchronizedCache, UnmodifiableCache,
};
pub use crate::store::weak::{Canonical, IntWeakHashCache, Interned, WeakHashCache, canonical};
pub use crate::traits::{Cache, CacheView, SharedCache};
