use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use embedrec::utils::metrics::MetricsCalculator;
use embedrec::{init_tracing, Config, Id, Interaction, RecommendationService};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML, JSON or YAML). Defaults apply when absent.
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Overrides the model path from the configuration.
    #[arg(short, long)]
    model: Option<PathBuf>,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Treat every id given on the command line as a string.
    #[arg(long)]
    string_ids: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on a JSON array of interactions, continuing from a saved model if present.
    Train {
        #[arg(short, long)]
        interactions: PathBuf,
    },
    /// Top entities for a user.
    Recommend {
        #[arg(short, long)]
        user: String,
        #[arg(short, default_value_t = 10)]
        k: usize,
    },
    /// Users most likely to engage with an entity.
    Users {
        #[arg(short, long)]
        entity: String,
        #[arg(short, default_value_t = 10)]
        k: usize,
    },
    /// Ranking and error metrics against held-out interactions.
    Evaluate {
        #[arg(short, long)]
        interactions: PathBuf,
        #[arg(short, default_value_t = 10)]
        k: usize,
    },
}

fn parse_id(raw: &str, string_ids: bool) -> Id {
    if string_ids {
        Id::from(raw)
    } else {
        Id::parse_lenient(raw)
    }
}

async fn read_interactions(path: &PathBuf) -> Result<Vec<Interaction>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read interactions from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid interactions file {}", path.display()))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };
    if let Some(model) = &args.model {
        config.storage.model_path = model.clone();
    }
    Ok(config)
}

fn print_ranked(ranked: &[(Id, f32)]) {
    for (rank, (id, score)) in ranked.iter().enumerate() {
        println!("{:>3}. {}\t{:.6}", rank + 1, id, score);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", &args.log_level);
    }
    init_tracing();

    let config = load_config(&args)?;
    info!("Model configuration: {:?}", config.model);
    let service = RecommendationService::open(config).await?;

    match &args.command {
        Command::Train { interactions } => {
            let interactions = read_interactions(interactions).await?;
            let report = service.fit(&interactions).await?;
            info!(
                "Trained on {} interactions ({} new users, {} new entities), final loss {:?}",
                report.interactions,
                report.new_users,
                report.new_entities,
                report.final_loss()
            );
            if report.interactions > 0 {
                service.save().await?;
            }
        }
        Command::Recommend { user, k } => {
            print_ranked(&service.recommend(&parse_id(user, args.string_ids), *k).await);
        }
        Command::Users { entity, k } => {
            print_ranked(&service.audience(&parse_id(entity, args.string_ids), *k).await);
        }
        Command::Evaluate { interactions, k } => {
            let holdout = read_interactions(interactions).await?;
            let calculator = MetricsCalculator::new(*k);
            let metrics = calculator.evaluate_model(&*service.read().await, &holdout).await;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }

    Ok(())
}
