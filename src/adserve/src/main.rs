//! adserve: select, simulate and report on advertisements from a catalog file.

use adserve_analytics::{AnalyticsAggregator, ClickHouseEventLog};
use adserve_cache::{ViewerContextCache, ViewerProfile};
use adserve_catalog::{CatalogSeed, InMemoryCatalog, InMemoryEventLog};
use adserve_core::config::AppConfig;
use adserve_core::context::TargetingContext;
use adserve_core::placement::Placement;
use adserve_core::store::{CatalogStore, EventLog, ViewerContextProvider};
use adserve_core::types::AdType;
use adserve_delivery::{DeliveryServices, DeliverySurface, Navigator, SurfaceProps};
use adserve_targeting::{AdSelector, SelectionRequest};
use adserve_tracking::EngagementRecorder;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const CACHE_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "adserve")]
#[command(about = "Advertisement targeting and delivery engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "ADSERVE__NODE_ID")]
    node_id: Option<String>,

    /// Back the viewer cache with Redis instead of process memory only
    #[arg(long, default_value_t = false)]
    redis: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank the eligible advertisements for one placement request
    Select {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        placement: Placement,
        /// Defaults to the placement's own ad type
        #[arg(long)]
        ad_type: Option<AdType>,
        #[arg(long = "pet-type")]
        pet_types: Vec<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        subscription: Option<String>,
        /// Overrides selection.candidate_limit
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print performance for one advertisement, or the whole catalog
    Report {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        ad: Option<Uuid>,
    },
    /// Mount a surface per view, mark each seen, and report the result
    Simulate {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        placement: Placement,
        /// Defaults to the placement's own ad type
        #[arg(long)]
        ad_type: Option<AdType>,
        #[arg(long, default_value_t = 100)]
        views: usize,
        /// Activate every Nth seen creative (0 disables clicks)
        #[arg(long, default_value_t = 0)]
        click_every: usize,
        #[arg(long)]
        viewer: Option<Uuid>,
        /// Stored as the viewer's profile before the first view
        #[arg(long = "pet-type", requires = "viewer")]
        pet_types: Vec<String>,
        #[arg(long, requires = "viewer")]
        location: Option<String>,
        #[arg(long, requires = "viewer")]
        subscription: Option<String>,
    },
}

/// Logs destinations instead of opening them.
struct LogNavigator;

impl Navigator for LogNavigator {
    fn open(&self, url: &str) {
        info!(url = %url, "Navigating to advertiser destination");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adserve=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }

    info!(
        node_id = %config.node_id,
        candidate_limit = config.selection.candidate_limit,
        visibility_threshold = config.delivery.visibility_threshold,
        tracking = config.tracking.enabled,
        "Configuration loaded"
    );

    match cli.command {
        Command::Select {
            catalog,
            placement,
            ad_type,
            pet_types,
            location,
            subscription,
            limit,
        } => {
            let catalog = load_catalog(&catalog).await?;
            let selector = AdSelector::new(catalog, &config.selection);

            let mut context = TargetingContext::anonymous().with_pet_types(pet_types);
            if let Some(location) = location {
                context = context.with_location(location);
            }
            if let Some(subscription) = subscription {
                context = context.with_subscription(subscription);
            }
            let request = SelectionRequest::new(
                ad_type.unwrap_or_else(|| placement.default_ad_type()),
                placement,
                context,
            );
            let candidates = selector
                .select(&request, limit.unwrap_or(selector.default_limit()))
                .await?;
            print_json(&candidates)?;
        }
        Command::Report { catalog, ad } => {
            let catalog = load_catalog(&catalog).await?;
            let aggregator = AnalyticsAggregator::new(catalog);
            match ad {
                Some(id) => print_json(&aggregator.performance(id).await?)?,
                None => print_json(&serde_json::json!({
                    "summary": aggregator.summary().await?,
                    "advertisements": aggregator.report().await?,
                }))?,
            }
        }
        Command::Simulate {
            catalog,
            placement,
            ad_type,
            views,
            click_every,
            viewer,
            pet_types,
            location,
            subscription,
        } => {
            let catalog = load_catalog(&catalog).await?;
            let clickhouse = clickhouse_log(&config).await;
            let events: Arc<dyn EventLog> = match &clickhouse {
                Some(log) => log.clone(),
                None => Arc::new(InMemoryEventLog::new()),
            };

            let cache = Arc::new(viewer_cache(&config, cli.redis).await);
            let cache_for_maintenance = cache.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(CACHE_MAINTENANCE_INTERVAL);
                loop {
                    interval.tick().await;
                    cache_for_maintenance.maintenance().await;
                }
            });

            let mut props = SurfaceProps::new(placement);
            if let Some(ad_type) = ad_type {
                props = props.with_ad_type(ad_type);
            }
            if let Some(viewer_id) = viewer {
                props = props.with_viewer(viewer_id);
                if !pet_types.is_empty() || location.is_some() || subscription.is_some() {
                    let profile = ViewerProfile {
                        viewer_id,
                        pet_types: pet_types.into_iter().collect(),
                        location,
                        subscription_type: subscription,
                    };
                    cache.put_profile(&profile).await?;
                    info!(viewer_id = %viewer_id, "Viewer profile stored");
                }
            }

            let viewers: Arc<dyn ViewerContextProvider> = cache;
            let selector = Arc::new(AdSelector::new(catalog.clone(), &config.selection));
            let recorder = Arc::new(EngagementRecorder::new(
                catalog.clone(),
                events,
                &config.tracking,
            ));
            let services = DeliveryServices::new(
                selector,
                recorder,
                viewers,
                Arc::new(LogNavigator),
                &config.delivery,
            );

            let mut seen = 0usize;
            for _ in 0..views {
                let surface = DeliverySurface::new(services.clone(), props.clone());
                surface.mount().await;
                if surface.on_visibility(1.0).is_some() {
                    seen += 1;
                    if click_every > 0 && seen % click_every == 0 {
                        surface.activate();
                    }
                }
                surface.settle().await;
                surface.unmount();
            }
            info!(views, seen, placement = %placement, "Simulation complete");

            if let Some(log) = clickhouse {
                log.shutdown().await;
            }

            print_json(&AnalyticsAggregator::new(catalog).report().await?)?;
        }
    }

    Ok(())
}

async fn load_catalog(path: &Path) -> anyhow::Result<Arc<dyn CatalogStore>> {
    let seed = CatalogSeed::load(path).await?;
    let catalog = InMemoryCatalog::from_seed(seed)?;
    info!(path = %path.display(), advertisements = catalog.len(), "Catalog loaded");
    Ok(Arc::new(catalog))
}

/// `None` when ClickHouse is disabled or unreachable; events then stay in memory.
async fn clickhouse_log(config: &AppConfig) -> Option<Arc<ClickHouseEventLog>> {
    if !config.clickhouse.enabled {
        return None;
    }
    match ClickHouseEventLog::new(&config.clickhouse).await {
        Ok(log) => Some(Arc::new(log)),
        Err(e) => {
            error!(error = %e, "Failed to connect to ClickHouse, keeping events in memory");
            None
        }
    }
}

async fn viewer_cache(config: &AppConfig, use_redis: bool) -> ViewerContextCache {
    if use_redis {
        match ViewerContextCache::connect(&config.redis).await {
            Ok(cache) => return cache,
            Err(e) => {
                error!(error = %e, "Failed to connect to Redis, using local viewer cache")
            }
        }
    }
    ViewerContextCache::local_only(&config.redis)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
