use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use data_loader::{ItemId, UserId};
use engine::{EngineConfig, ItemSummary, ModelKind, Recommendation, RecommendationEngine};
use pipeline::EvaluationReport;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// recsys - rating prediction and top-K recommendation
#[derive(Parser)]
#[command(name = "recsys")]
#[command(about = "Bias baseline, latent-factor and content recommenders over MovieLens-style data", long_about = None)]
struct Cli {
    /// Path to the dataset directory
    #[arg(short, long, default_value = "data/ml-100k")]
    data_dir: PathBuf,

    /// JSON file overriding the default engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the split and the latent model
    #[arg(long)]
    seed: Option<u32>,

    /// Latent-factor training epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Stop latent training once an epoch's mean loss falls below this
    #[arg(long)]
    target_loss: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train every model and print the training summary
    Train {
        #[arg(long)]
        json: bool,
    },

    /// Get recommendations for a user
    Recommend {
        /// User ID to get recommendations for
        #[arg(long)]
        user_id: UserId,

        /// Number of recommendations to return
        #[arg(long, default_value = "10")]
        limit: usize,

        #[arg(long, value_enum, default_value_t = ModelArg::Latent)]
        model: ModelArg,

        /// Content feature shifts, e.g. `--adjust energy=1.0` or `--adjust Drama=1.5` (content model only)
        #[arg(long, value_parser = parse_adjustment)]
        adjust: Vec<(String, f32)>,

        #[arg(long)]
        json: bool,
    },

    /// Evaluate on the held-out split (all models when --model is omitted)
    Evaluate {
        #[arg(long, value_enum)]
        model: Option<ModelArg>,

        #[arg(long)]
        json: bool,
    },

    /// Show a user's profile and rating history
    User {
        /// User ID to display
        #[arg(long)]
        user_id: UserId,
    },

    /// Search for items by title
    Search {
        /// Title to search for (case-insensitive substring match)
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Items most similar to a given item by content
    Similar {
        #[arg(long)]
        item_id: ItemId,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Browse the catalog by genre and/or release year
    Browse {
        #[arg(long)]
        genre: Option<String>,

        #[arg(long)]
        from_year: Option<u16>,

        #[arg(long)]
        to_year: Option<u16>,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Time recommendation requests for random users
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        #[arg(long, value_enum, default_value_t = ModelArg::Latent)]
        model: ModelArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    Baseline,
    Latent,
    Content,
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Baseline => ModelKind::Baseline,
            ModelArg::Latent => ModelKind::Latent,
            ModelArg::Content => ModelKind::Content,
        }
    }
}

fn parse_adjustment(s: &str) -> Result<(String, f32)> {
    let (name, delta) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected FEATURE=DELTA, got '{}'", s))?;
    let delta: f32 = delta
        .trim()
        .parse()
        .with_context(|| format!("invalid delta in '{}'", s))?;
    Ok((name.trim().to_string(), delta))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    println!("Loading dataset from {}...", cli.data_dir.display());
    let start = Instant::now();
    let mut engine = RecommendationEngine::load(cli.data_dir.clone(), config)
        .await
        .context("Failed to load dataset")?;
    let (users, items, ratings) = engine.dataset().counts();
    println!(
        "{} Loaded {} users, {} items, {} ratings in {:?}",
        "✓".green(),
        users,
        items,
        ratings,
        start.elapsed()
    );
    report_skips(&engine);

    // Commands that only need the dataset
    match &cli.command {
        Commands::User { user_id } => return handle_user(&engine, *user_id),
        Commands::Search { title, limit } => return handle_search(&engine, title, *limit),
        Commands::Similar { item_id, limit } => return handle_similar(&engine, *item_id, *limit),
        Commands::Browse {
            genre,
            from_year,
            to_year,
            limit,
        } => return handle_browse(&engine, genre.as_deref(), *from_year, *to_year, *limit),
        _ => {}
    }

    let train_json = matches!(cli.command, Commands::Train { json: true });
    train(&mut engine, cli.target_loss, train_json)?;

    match cli.command {
        Commands::Train { .. } => {}
        Commands::Recommend {
            user_id,
            limit,
            model,
            adjust,
            json,
        } => handle_recommend(&engine, user_id, limit, model.into(), &adjust, json)?,
        Commands::Evaluate { model, json } => handle_evaluate(&engine, model.map(Into::into), json)?,
        Commands::Benchmark { requests, model } => {
            handle_benchmark(Arc::new(engine), requests, model.into()).await?
        }
        Commands::User { .. }
        | Commands::Search { .. }
        | Commands::Similar { .. }
        | Commands::Browse { .. } => {}
    }

    Ok(())
}

/// Defaults, then the JSON file, then command-line flags
fn build_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            EngineConfig::from_json(&json)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if let Some(epochs) = cli.epochs {
        config = config.with_epochs(epochs);
    }
    config.validate()?;
    Ok(config)
}

fn report_skips(engine: &RecommendationEngine) {
    let report = engine.load_report();
    let skipped = report.skipped_ratings + report.skipped_items + report.skipped_users + report.skipped_tracks;
    if skipped > 0 {
        println!(
            "{} Skipped {} malformed rows (ratings {}, items {}, users {}, tracks {})",
            "!".yellow(),
            skipped,
            report.skipped_ratings,
            report.skipped_items,
            report.skipped_users,
            report.skipped_tracks
        );
    }
    if report.clipped_track_values > 0 {
        println!(
            "{} Clipped {} out-of-range track feature values",
            "!".yellow(),
            report.clipped_track_values
        );
    }
    if report.unknown_users + report.unknown_items > 0 {
        println!(
            "{} {} users and {} items are referenced by ratings but have no metadata",
            "!".yellow(),
            report.unknown_users,
            report.unknown_items
        );
    }
}

fn train(engine: &mut RecommendationEngine, target_loss: Option<f32>, json: bool) -> Result<()> {
    let summary = engine.train(|stats| {
        info!(epoch = stats.epoch, loss = stats.mean_loss, "epoch");
        match target_loss {
            Some(target) if stats.mean_loss < target => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} Trained on {} ratings ({} held out), {} epochs, final loss {} in {}ms",
            "✓".green(),
            summary.train_size,
            summary.validation_size,
            summary.epochs_completed,
            summary
                .final_loss
                .map(|l| format!("{:.4}", l))
                .unwrap_or_else(|| "n/a".to_string()),
            summary.elapsed_ms
        );
    }
    Ok(())
}

/// Handle the 'recommend' command
fn handle_recommend(
    engine: &RecommendationEngine,
    user_id: UserId,
    limit: usize,
    model: ModelKind,
    adjust: &[(String, f32)],
    json: bool,
) -> Result<()> {
    let recommendations = if adjust.is_empty() {
        engine.recommend(user_id, limit, model)?
    } else {
        if model != ModelKind::Content {
            bail!("--adjust only applies to the content model");
        }
        let adjustments: Vec<(&str, f32)> = adjust.iter().map(|(n, d)| (n.as_str(), *d)).collect();
        engine.recommend_adjusted(user_id, &adjustments, limit)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
    } else {
        print_recommendations(
            &format!("Top {} for user {} ({})", limit, user_id, model),
            &recommendations,
        );
    }
    Ok(())
}

/// Handle the 'evaluate' command
fn handle_evaluate(engine: &RecommendationEngine, model: Option<ModelKind>, json: bool) -> Result<()> {
    let reports: Vec<(ModelKind, EvaluationReport)> = match model {
        Some(kind) => vec![(kind, engine.evaluate(kind)?)],
        None => engine.evaluate_all()?,
    };

    if json {
        let value: serde_json::Map<String, serde_json::Value> = reports
            .iter()
            .map(|(kind, report)| -> Result<(String, serde_json::Value)> {
                Ok((kind.to_string(), serde_json::to_value(report)?))
            })
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let k = engine.config().evaluation.k;
    println!("{}", format!("Offline evaluation (K = {})", k).bold().blue());
    for (kind, report) in &reports {
        println!(
            "{:>9}  precision@{} {:.4}  recall@{} {:.4}  accuracy {:.4}  ({} users, {} held out)",
            kind.to_string().green(),
            k,
            report.precision,
            k,
            report.recall,
            report.accuracy,
            report.users_evaluated,
            report.holdout_size
        );
    }
    Ok(())
}

/// Handle the 'user' command
fn handle_user(engine: &RecommendationEngine, user_id: UserId) -> Result<()> {
    let profile = engine.user_profile(user_id)?;

    println!("{}", format!("User ID: {}", user_id).bold().blue());
    if let Some(user) = &profile.demographics {
        if let Some(age) = user.age {
            println!("{}Age: {}", "• ".green(), age);
        }
        if let Some(gender) = user.gender {
            println!("{}Gender: {}", "• ".green(), gender.code());
        }
        if let Some(occupation) = &user.occupation {
            println!("{}Occupation: {}", "• ".green(), occupation);
        }
    }
    println!("{}Number of ratings: {}", "• ".cyan(), profile.ratings_count);
    println!("{}Average rating: {:.2}", "• ".cyan(), profile.mean_rating);

    println!("Top rated items:");
    for (item_id, rating) in &profile.top_rated {
        let title = engine
            .dataset()
            .get_item(*item_id)
            .map(|item| item.title.clone())
            .unwrap_or_else(|| format!("Item #{}", item_id));
        println!("  - {} (Rating: {})", title, rating);
    }

    println!("Most rated genres:");
    for (genre, count) in &profile.top_genres {
        println!("  - {}: {} ratings", genre, count);
    }
    Ok(())
}

/// Handle the 'search' command
fn handle_search(engine: &RecommendationEngine, title: &str, limit: usize) -> Result<()> {
    let matches = engine.search(title, limit);
    println!("{}", format!("Search results for '{}':", title).bold().blue());
    if matches.is_empty() {
        println!("  (no matches)");
    }
    print_items(&matches);
    Ok(())
}

/// Handle the 'similar' command
fn handle_similar(engine: &RecommendationEngine, item_id: ItemId, limit: usize) -> Result<()> {
    let similar = engine.similar_items(item_id, limit)?;
    let title = engine
        .dataset()
        .get_item(item_id)
        .map(|item| item.title.clone())
        .unwrap_or_else(|| format!("Item #{}", item_id));
    print_recommendations(&format!("Similar to {}", title), &similar);
    Ok(())
}

/// Handle the 'browse' command
fn handle_browse(
    engine: &RecommendationEngine,
    genre: Option<&str>,
    from_year: Option<u16>,
    to_year: Option<u16>,
    limit: usize,
) -> Result<()> {
    if genre.is_none() && from_year.is_none() && to_year.is_none() {
        println!("{}", "Genres:".bold().blue());
        for (genre, count) in engine.genre_counts() {
            println!("  - {} ({} items)", genre, count);
        }
        return Ok(());
    }

    let years = match (from_year, to_year) {
        (None, None) => None,
        (start, end) => Some((start.unwrap_or(0), end.unwrap_or(u16::MAX))),
    };
    let items = engine.browse(genre, years, limit);
    println!("{}", "Most popular matches:".bold().blue());
    print_items(&items);
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(engine: Arc<RecommendationEngine>, requests: usize, model: ModelKind) -> Result<()> {
    let user_ids = engine.dataset().user_ids();
    if user_ids.is_empty() || requests == 0 {
        bail!("Nothing to benchmark");
    }

    let picks: Vec<UserId> = (0..requests)
        .map(|_| user_ids[rand::random::<u32>() as usize % user_ids.len()])
        .collect();

    let wall = Instant::now();
    let mut handles = vec![];
    for user in picks {
        let engine = engine.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            engine.recommend(user, 20, model)?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings: Vec<Duration> = Vec::with_capacity(handles.len());
    for handle in handles {
        timings.push(handle.await??);
    }
    let wall = wall.elapsed();

    let total: Duration = timings.iter().sum();
    let avg_latency = total / timings.len() as u32;
    timings.sort();
    let percentile = |p: f32| timings[((timings.len() as f32 * p) as usize).min(timings.len() - 1)];
    let throughput = requests as f32 / wall.as_secs_f32();

    println!("{}", format!("Benchmark results ({})", model).bold().blue());
    println!("Wall time: {:?}", wall);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(0.50));
    println!("P95 latency: {:?}", percentile(0.95));
    println!("P99 latency: {:?}", percentile(0.99));
    println!("Throughput: {:.2} requests/second", throughput);
    Ok(())
}

fn print_recommendations(header: &str, recommendations: &[Recommendation]) {
    println!("{}", header.bold().blue());
    if recommendations.is_empty() {
        println!("  (nothing to recommend)");
    }
    for (rank, rec) in recommendations.iter().enumerate() {
        println!(
            "{}. {}{} [{}] - Score: {:.3}",
            (rank + 1).to_string().green(),
            rec.title,
            rec.year.map(|y| format!(" ({})", y)).unwrap_or_default(),
            rec.genres.join(", "),
            rec.score
        );
    }
}

fn print_items(items: &[ItemSummary]) {
    for item in items {
        println!(
            "{}: {}{} [{}] avg {:.2} ({} ratings)",
            item.item_id,
            item.title,
            item.year.map(|y| format!(" ({})", y)).unwrap_or_default(),
            item.genres.join(", "),
            item.avg_rating,
            item.rating_count
        );
    }
}
