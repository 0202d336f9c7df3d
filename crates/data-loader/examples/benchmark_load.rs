use anyhow::Context;
use data_loader::{Dataset, DatasetLayout};
use std::path::Path;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    // Surface skipped-row and missing-file warnings
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let data_dir = Path::new("data/ml-100k");

    println!("Loading MovieLens 100k dataset...\n");

    let start = Instant::now();
    let dataset = Dataset::load_from_files(data_dir, &DatasetLayout::default())
        .context("Failed to load dataset")?;
    let elapsed = start.elapsed();

    let (users, items, ratings) = dataset.counts();
    let report = dataset.report();

    println!("\n=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Users: {}", users);
    println!("Items: {}", items);
    println!("Ratings: {}", ratings);
    println!(
        "Skipped rows: ratings={} items={} users={}",
        report.skipped_ratings, report.skipped_items, report.skipped_users
    );
    println!("\nPerformance: {:.0} ratings/second",
             ratings as f64 / elapsed.as_secs_f64());
    Ok(())
}
