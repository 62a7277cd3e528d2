use std::sync::Arc;

use episode_analyzer::core::resolver::{DescriptorCache, LocationCache};
use episode_analyzer::{AnyStore, EpisodeResolver};

use crate::models::config::AnalyzerConfig;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<EpisodeResolver<AnyStore>>,
    pub config: Arc<AnalyzerConfig>,
}

impl AppState {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_store(config.build_store(), config)
    }

    /// Builds the state around an explicit store, sharing the two caches
    /// between every request.
    pub fn with_store(store: AnyStore, config: AnalyzerConfig) -> Self {
        let ttl = config.cache_ttl();
        let descriptors = Arc::new(DescriptorCache::new(ttl, config.cache.max_entries));
        // Holds at least one full sample
        let locations = Arc::new(LocationCache::new(
            ttl,
            config.cache.max_entries.max(config.sample_cap),
        ));

        let resolver = EpisodeResolver::new(
            Arc::new(store),
            config.resolver_options(),
            descriptors,
            locations,
        );

        Self {
            resolver: Arc::new(resolver),
            config: Arc::new(config),
        }
    }
}
