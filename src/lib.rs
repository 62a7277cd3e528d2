// Robot episode dataset analyzer
// Library entry point

pub mod analysis;
pub mod core;

// Re-export main types
pub use analysis::report::{analyze, flagged_episodes, CrossEpisodeReport};
pub use analysis::view::AnalyticsOptions;
pub use core::error::{DatasetError, NotComputed, Result};
pub use core::format::{DatasetDescriptor, EpisodeLocation, EpisodeRecord};
pub use core::resolver::{EpisodeResolver, ResolverOptions};
pub use core::sample::{load_sample, CrossEpisodeSample};
pub use core::store::{AnyStore, DatasetStore, HttpStore, LocalStore, MemoryStore};
