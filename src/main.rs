//! iptv-hub - command line front end for the provider engine
//!
//! Every command prints JSON on stdout; logs go to stderr.

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use iptv_hub::aggregator::{get_provider_statistics, sort_channels_by_availability};
use iptv_hub::registry::ProviderRegistry;
use iptv_hub::search::{SearchOptions, DEFAULT_SUGGESTION_LIMIT};
use iptv_hub::store::{JsonFileStore, StateRepository};
use iptv_hub::{fetcher::HttpFetcher, EngineConfig, ProviderManager};
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// iptv-hub - Multi-provider IPTV channel directory
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Persisted state file path
    #[arg(long)]
    state: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured providers
    Providers {
        /// Include disabled providers
        #[arg(long)]
        all: bool,

        /// Only providers for this region code
        #[arg(long)]
        region: Option<String>,
    },

    /// Probe provider health (all enabled providers when none are named)
    Health {
        ids: Vec<String>,

        /// Print only per-status counts
        #[arg(long)]
        summary: bool,

        /// Forget cached health before checking
        #[arg(long)]
        refresh: bool,
    },

    /// Reachability check without updating health
    Availability { ids: Vec<String> },

    /// Fetch channels from one provider, or with failover when none is named
    Fetch {
        provider: Option<String>,

        /// Failover attempt budget
        #[arg(long)]
        retries: Option<usize>,

        /// Group channel names by category
        #[arg(long)]
        categories: bool,
    },

    /// Fetch several providers and merge their channels
    Aggregate {
        ids: Vec<String>,

        /// Order by number of providers carrying each channel
        #[arg(long)]
        sort: bool,

        /// Print unique/shared counts for a provider instead of channels
        #[arg(long)]
        stats: Option<String>,
    },

    /// Search the merged catalogue of the given providers
    Search {
        query: String,

        /// Provider to include (repeatable, defaults to the best provider)
        #[arg(short, long = "provider")]
        providers: Vec<String>,

        #[arg(long, default_value = "100")]
        limit: usize,

        /// Print name suggestions instead of ranked results
        #[arg(long)]
        suggest: bool,
    },

    /// Show, set or clear the preferred provider
    Prefer {
        id: Option<String>,

        #[arg(long)]
        clear: bool,
    },

    /// Show selection history and failed providers
    History {
        /// Forget the failed provider set
        #[arg(long)]
        reset_failed: bool,
    },
}

#[derive(Serialize)]
struct SearchRow<'a> {
    score: f64,
    name: &'a str,
    group: Option<&'a str>,
    country: Option<&'a str>,
    url: &'a str,
    providers: Vec<&'a str>,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_manager(args: &Args) -> ProviderManager {
    if args.config.is_none() && args.state.is_none() {
        return ProviderManager::with_defaults();
    }

    let config = match &args.config {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    };
    let state_path = args
        .state
        .clone()
        .unwrap_or_else(|| EngineConfig::data_dir().join("state.json"));
    let store = JsonFileStore::open(state_path);
    let registry = ProviderRegistry::from_config(&config);
    let fetcher = Arc::new(HttpFetcher::new(&config));
    ProviderManager::new(config, registry, fetcher, StateRepository::new(Arc::new(store)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let manager = build_manager(&args);

    match args.command {
        Command::Providers { all, region } => {
            let providers: Vec<_> = if all {
                manager.list_providers().iter().collect()
            } else {
                manager.list_providers().iter().filter(|p| p.enabled).collect()
            };
            let providers: Vec<_> = match region {
                Some(region) => providers
                    .into_iter()
                    .filter(|p| p.region.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(&region)))
                    .collect(),
                None => providers,
            };
            print_json(&providers)?;
        }

        Command::Health { ids, summary, refresh } => {
            if refresh {
                manager.clear_health();
            }
            let health: BTreeMap<_, _> = manager.run_health_checks(&ids).into_iter().collect();
            if summary {
                print_json(&manager.health_summary())?;
            } else {
                print_json(&health)?;
            }
        }

        Command::Availability { ids } => {
            let reachable: BTreeMap<_, _> = manager.test_availability(&ids).into_iter().collect();
            print_json(&reachable)?;
        }

        Command::Fetch {
            provider,
            retries,
            categories,
        } => {
            let (provider_id, channels) = match provider {
                Some(id) => {
                    let channels = manager.fetch_channels_from(&id)?;
                    (id, channels)
                }
                None => {
                    let retries = retries.unwrap_or(manager.config().max_retries);
                    let result = manager.fetch_channels_with_failover(&manager.enabled_providers(), retries)?;
                    info!("Served by {} after {} attempt(s)", result.provider_id, result.attempts);
                    (result.provider_id, result.channels)
                }
            };
            info!("{} channels from {}", channels.len(), provider_id);

            if categories {
                let grouped: BTreeMap<String, Vec<&str>> = manager
                    .classifier()
                    .group_by_category(&channels)
                    .into_iter()
                    .map(|(category, list)| (category, list.into_iter().map(|c| c.name.as_str()).collect()))
                    .collect();
                print_json(&grouped)?;
            } else {
                print_json(&channels)?;
            }
        }

        Command::Aggregate { ids, sort, stats } => {
            let mut result = manager.fetch_and_aggregate(&ids)?;
            if let Some(provider_id) = stats {
                print_json(&get_provider_statistics(&result.channels, &provider_id))?;
                return Ok(());
            }
            if sort {
                sort_channels_by_availability(&mut result.channels);
            }
            print_json(&result)?;
        }

        Command::Search {
            query,
            providers,
            limit,
            suggest,
        } => {
            let ids = if providers.is_empty() {
                vec![manager.select_best_provider(None)?.id]
            } else {
                providers
            };
            let catalogue = manager.fetch_and_aggregate(&ids)?.channels;

            if suggest {
                print_json(&manager.search_suggestions(&catalogue, &query, DEFAULT_SUGGESTION_LIMIT.min(limit)))?;
            } else {
                let opts = SearchOptions {
                    max_results: limit,
                    ..Default::default()
                };
                let rows: Vec<SearchRow> = manager
                    .search(&catalogue, &query, &opts)
                    .into_iter()
                    .map(|hit| {
                        let item = hit.item;
                        SearchRow {
                            score: hit.score,
                            name: &item.channel.name,
                            group: item.channel.group.as_deref(),
                            country: item.channel.country.as_deref(),
                            url: &item.channel.url,
                            providers: item.providers.iter().map(String::as_str).collect(),
                        }
                    })
                    .collect();
                print_json(&rows)?;
            }
        }

        Command::Prefer { id, clear } => {
            if clear {
                manager.set_preferred_provider(None)?;
            } else if let Some(id) = id.as_deref() {
                manager.set_preferred_provider(Some(id))?;
            }
            print_json(&manager.preferred_provider())?;
        }

        Command::History { reset_failed } => {
            if reset_failed {
                manager.reset_failed_providers()?;
            }
            #[derive(Serialize)]
            struct History {
                failed_providers: Vec<String>,
                selections: Vec<iptv_hub::models::SelectionRecord>,
            }
            print_json(&History {
                failed_providers: manager.failed_providers().into_iter().collect(),
                selections: manager.selection_history(),
            })?;
        }
    }

    Ok(())
}
