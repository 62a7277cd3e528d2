// Example usage: analyze a dataset stored on local disk
//
//   cargo run --example analyze_dataset -- /data/lerobot org/dataset [episode]

use std::sync::Arc;
use std::time::Duration;

use episode_analyzer::analysis::grouping::group_series;
use episode_analyzer::analysis::lengths::episode_length_stats;
use episode_analyzer::analysis::report::{render_flagged, AnalyticOutcome};
use episode_analyzer::core::resolver::{DescriptorCache, LocationCache};
use episode_analyzer::{
    analyze, flagged_episodes, load_sample, AnalyticsOptions, EpisodeResolver, LocalStore,
    ResolverOptions, Result,
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args: Vec<String> = std::env::args().collect();
    let root = args.get(1).map(String::as_str).unwrap_or("data");
    let dataset = args.get(2).map(String::as_str).unwrap_or("lerobot/pusht");
    let episode: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0);

    let ttl = Duration::from_secs(300);
    let resolver = Arc::new(EpisodeResolver::new(
        Arc::new(LocalStore::new(root)),
        ResolverOptions::default(),
        Arc::new(DescriptorCache::new(ttl, 16)),
        Arc::new(LocationCache::new(ttl, 1024)),
    ));

    let descriptor = resolver.descriptor(dataset).await?;
    info!(
        "{} {} ({:?}): {} episodes at {} fps",
        dataset, descriptor.version, descriptor.layout, descriptor.total_episodes, descriptor.fps
    );

    // One episode, grouped for charting
    let (location, record) = resolver.resolve_episode(dataset, episode).await?;
    info!(
        "Episode {}: {} frames, {:.2}s, file {}",
        episode,
        record.len(),
        record.duration(),
        location.data_path()
    );
    if let Some(task) = &record.task {
        info!("  Task: {}", task);
    }
    for group in group_series(&record) {
        info!("  Group: {}", group.series.join(", "));
    }

    // Episode lengths
    let lengths = resolver.episode_lengths(dataset).await?;
    if let Some(stats) = episode_length_stats(&lengths, descriptor.fps) {
        info!(
            "Lengths: mean {}s, median {}s, std {}s over {} episodes",
            stats.mean, stats.median, stats.std_dev, stats.episodes
        );
    }

    // Cross-episode analytics
    let sample = load_sample(resolver.clone(), dataset, 100, 8).await?;
    let report = analyze(&sample, &AnalyticsOptions::default());
    for outcome in &report.outcomes {
        match outcome {
            AnalyticOutcome::Computed { result } => info!("{:?}: computed", result.kind()),
            AnalyticOutcome::NotComputed { kind, reason } => warn!("{:?}: {}", kind, reason),
        }
    }

    let flagged = flagged_episodes(&report, &[]);
    info!("Flagged episodes: [{}]", render_flagged(&flagged));

    Ok(())
}
