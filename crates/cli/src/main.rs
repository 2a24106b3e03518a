use clap::{Parser, Subcommand};
use epr_client::{HttpTransport, DEFAULT_TIMEOUT_SECS};
use epr_core::config::{
    categories_from_env_value, reference_hospital_from_env_value, resolve_field_registry,
};
use epr_core::{
    classify, search_patients, sort_episodes, CoreConfig, DateField, DateValue, Episode,
    EpisodeOrdering, PatientMatch, SaveError,
};
use epr_types::dates::{format_date, parse_date};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "epr")]
#[command(about = "EPR clinical episode CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show one episode
    Show {
        /// Episode id
        id: i64,
    },
    /// Show several episodes in list order
    List {
        /// Episode ids
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Look up a patient by hospital number
    Lookup {
        /// Hospital number (may be blank)
        hospital_number: String,
    },
    /// Change an episode's category
    SetCategory {
        /// Episode id
        id: i64,
        /// New category name
        category: String,
    },
    /// Set an episode's discharge date
    Discharge {
        /// Episode id
        id: i64,
        /// Discharge date (DD/MM/YYYY, default today)
        #[arg(long)]
        date: Option<String>,
    },
}

/// Configuration read from the environment at startup.
struct Settings {
    core: CoreConfig,
    transport: HttpTransport,
}

fn settings_from_env() -> anyhow::Result<Settings> {
    let registry = resolve_field_registry(std::env::var("EPR_SCHEMA_PATH").ok().map(PathBuf::from))?;
    let ordering = EpisodeOrdering::new(
        categories_from_env_value(std::env::var("EPR_CATEGORIES").ok())?,
        reference_hospital_from_env_value(std::env::var("EPR_REFERENCE_HOSPITAL").ok()),
    );

    let api_url = std::env::var("EPR_API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".into());
    let timeout_secs = match std::env::var("EPR_HTTP_TIMEOUT_SECS") {
        Ok(value) => value.trim().parse()?,
        Err(_) => DEFAULT_TIMEOUT_SECS,
    };
    let transport = HttpTransport::new(&api_url, Duration::from_secs(timeout_secs))?;

    Ok(Settings {
        core: CoreConfig::new(registry, ordering),
        transport,
    })
}

fn print_episode(episode: &Episode) {
    println!(
        "Episode {}: {} ({})",
        episode
            .id()
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        episode.full_name(),
        episode.link()
    );
    println!(
        "  Category: {}",
        episode.category_name().unwrap_or("-")
    );
    for field in [DateField::DateOfAdmission, DateField::DischargeDate] {
        if let Some(date) = episode.date(field) {
            println!("  {}: {}", field, format_date(date));
        }
    }
    println!("  Discharged: {}", episode.is_discharged());

    let tags = episode.tags();
    if !tags.is_empty() {
        println!("  Tags: {}", tags.join(", "));
    }

    for descriptor in episode.registry().iter() {
        let count = episode.number_of_items(&descriptor.name);
        if count > 0 {
            println!("  {}: {}", descriptor.display_name(), count);
        }
    }
}

fn report_save(id: i64, result: Result<(), SaveError>) {
    match result {
        Ok(()) => println!("Saved episode {}", id),
        Err(e @ SaveError::Conflict { .. }) => {
            eprintln!("Conflict: {}", e);
        }
        Err(e) => eprintln!("Error saving episode: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("epr=warn".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'epr --help' for commands");
        return Ok(());
    };

    let settings = settings_from_env()?;
    let registry = settings.core.registry().clone();
    let transport = &settings.transport;

    match command {
        Commands::Show { id } => {
            match Episode::load(id, transport, registry).await {
                Ok(episode) => print_episode(&episode),
                Err(e) => eprintln!("Error loading episode {}: {}", id, e),
            }
        }
        Commands::List { ids } => {
            let mut episodes = Vec::with_capacity(ids.len());
            for id in ids {
                match Episode::load(id, transport, registry.clone()).await {
                    Ok(episode) => episodes.push(episode),
                    Err(e) => eprintln!("Skipping episode {}: {}", id, e),
                }
            }
            sort_episodes(&mut episodes, settings.core.ordering());
            for episode in &episodes {
                print_episode(episode);
            }
        }
        Commands::Lookup { hospital_number } => {
            let result = search_patients(&hospital_number, transport).await?;
            match classify(result)? {
                PatientMatch::NewPatient(_) => println!("No patient found; register a new patient."),
                PatientMatch::ExistingPatient(record) => {
                    let name = record
                        .primary_demographics()
                        .map(|d| d.full_name())
                        .unwrap_or_default();
                    println!("Found patient {}: {}", record.id, name);
                    for episode_id in record.episodes.keys() {
                        println!("  Episode {}", episode_id);
                    }
                }
                PatientMatch::Ambiguous(result) => {
                    eprintln!(
                        "{} patients share this hospital number; resolve the duplicate records first.",
                        result.patients().len()
                    );
                }
            }
        }
        Commands::SetCategory { id, category } => {
            let mut episode = Episode::load(id, transport, registry).await?;
            let mut update = episode.make_copy().into_update()?;
            update.set_category(category);
            report_save(id, episode.save(update, transport).await);
        }
        Commands::Discharge { id, date } => {
            let date = match date {
                Some(text) => parse_date(&text)?,
                None => chrono::Local::now().date_naive(),
            };
            let mut episode = Episode::load(id, transport, registry).await?;
            let mut update = episode.make_copy().into_update()?;
            update.set_date(DateField::DischargeDate, Some(DateValue::Date(date)));
            report_save(id, episode.save(update, transport).await);
        }
    }

    Ok(())
}
