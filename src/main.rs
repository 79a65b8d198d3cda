use futures::future::join_all;
use review_reconciler::config::{AppConfig, ListingConfig, load_config};
use review_reconciler::model::RawReview;
use review_reconciler::normalizer::TagNormalizer;
use review_reconciler::reconciler::Reconciler;
use review_reconciler::storage::SqliteStorage;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Panic occurred: {:?}", panic_info);
    }));

    let mut config_path = String::from("config.json");
    let mut purge_duplicates = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--purge-duplicates" => purge_duplicates = true,
            _ => config_path = arg,
        }
    }

    let config: AppConfig = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error ({}): {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };

    let mapping_path = config.mapping_path();
    let tags = match TagNormalizer::from_path(&mapping_path) {
        Ok(tags) => tags,
        Err(e) => {
            error!("Mapping load error ({}): {}", mapping_path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let reconciler = Reconciler::new(tags, config.score_scales());

    let storage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, finishing the current record and stopping...");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    info!("Listings to process: {}", config.listings.len());
    let tasks: Vec<_> = config
        .listings
        .iter()
        .map(|listing| process_listing(listing, &reconciler, storage.clone(), cancel.clone()))
        .collect();
    let results = join_all(tasks).await;
    let failed_listings = results.iter().filter(|ok| !**ok).count();

    audit_duplicates(&storage, purge_duplicates).await;

    if failed_listings > 0 {
        error!("{} listing(s) could not be read", failed_listings);
        return ExitCode::FAILURE;
    }
    info!("Done.");
    ExitCode::SUCCESS
}

/// Reads one listing's scraper dump and reconciles it. Returns false when the
/// input itself could not be loaded.
async fn process_listing(
    listing: &ListingConfig,
    reconciler: &Reconciler,
    storage: Arc<Mutex<SqliteStorage>>,
    cancel: Arc<AtomicBool>,
) -> bool {
    let target = listing.target();
    info!(
        "[listing {}] Reading {}",
        target.listing_id,
        listing.input.display()
    );

    let content = match tokio::fs::read_to_string(&listing.input).await {
        Ok(content) => content,
        Err(e) => {
            error!("[listing {}] Cannot read input: {}", target.listing_id, e);
            return false;
        }
    };
    let raw_reviews: Vec<RawReview> = match serde_json::from_str(&content) {
        Ok(reviews) => reviews,
        Err(e) => {
            error!("[listing {}] Input is not a review array: {}", target.listing_id, e);
            return false;
        }
    };

    let mut storage_guard = storage.lock().await;
    let report = reconciler.reconcile_with_cancel(&raw_reviews, &target, &mut *storage_guard, &cancel);
    drop(storage_guard);

    if report.cancelled {
        warn!(
            "[listing {}] Stopped early after {} of {} records",
            target.listing_id,
            report.processed(),
            raw_reviews.len()
        );
    }
    for failure in &report.failures {
        warn!(
            "[listing {}] record #{} skipped at {}: {}",
            target.listing_id, failure.index, failure.stage, failure.reason
        );
    }
    true
}

async fn audit_duplicates(storage: &Arc<Mutex<SqliteStorage>>, purge: bool) {
    let mut storage_guard = storage.lock().await;
    let groups = match storage_guard.find_duplicate_groups() {
        Ok(groups) => groups,
        Err(e) => {
            warn!("Duplicate audit failed: {}", e);
            return;
        }
    };
    if groups.is_empty() {
        info!("Duplicate audit: no duplicate groups");
        return;
    }

    let extra: usize = groups.iter().map(|g| g.hashes.len() - 1).sum();
    warn!(
        "Duplicate audit: {} groups, {} redundant rows",
        groups.len(),
        extra
    );
    for group in &groups {
        info!(
            "  listing {} / {} / {} / {}: {} rows",
            group.listing_id,
            group.reviewer_name,
            group.review_date,
            group.overall_score_original.as_deref().unwrap_or("-"),
            group.hashes.len()
        );
    }

    if purge {
        match storage_guard.purge_duplicates(&groups) {
            Ok(deleted) => info!("Purged {} duplicate rows, kept the newest of each group", deleted),
            Err(e) => error!("Duplicate purge failed: {}", e),
        }
    }
}
