mod config;
use clap::{Parser, Subcommand};
use config::Config;
use serde::Serialize;
use slotwarden_core::{Group, MetaError, MetaStore, Proxy, Result, SlotMapping, Topom, TopologyPaths};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "slotwarden-admin")]
#[command(about = "Inspect and guard cluster topology in the coordination service")]
struct Cli {
    /// Path to configuration file
    #[arg(long = "conf", global = true, default_value = "slotwarden.yaml")]
    conf: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show who currently holds a cluster's lock
    Leader {
        /// Cluster (product) name; defaults to product.name from config
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Take the lock and hold it until interrupted
    Hold {
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Take the lock, print the whole topology as JSON, then release
    Dump {
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Delete a lock node left behind by a crashed owner
    RemoveLock {
        #[arg(long)]
        cluster: Option<String>,

        /// Required; the current owner loses its lock without notice
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Serialize)]
struct TopologyDump {
    cluster: String,
    slots: Vec<SlotMapping>,
    proxies: Vec<Proxy>,
    groups: Vec<Group>,
}

fn cluster_name(cfg: &Config, cluster: Option<String>) -> String {
    cluster.unwrap_or_else(|| cfg.product.name.clone())
}

fn leader_descriptor(cfg: &Config, cluster: &str) -> Topom {
    Topom::new(cluster, cfg.product.admin_addr.clone())
}

async fn show_leader(cfg: &Config, cluster: &str) -> Result<()> {
    let store = MetaStore::connect(&cfg.coordinator_builder()).await?;
    let leader = store.load_leader(cluster).await;
    store.close().await?;

    match leader? {
        Some(topom) => println!("{}", serde_json::to_string_pretty(&topom)?),
        None => println!("cluster {} has no leader", cluster),
    }
    Ok(())
}

async fn hold_lock(cfg: &Config, cluster: &str) -> Result<()> {
    let store = MetaStore::connect(&cfg.coordinator_builder()).await?;
    let topom = leader_descriptor(cfg, cluster);

    if let Err(error) = store.acquire(cluster, &topom).await {
        store.close().await?;
        return Err(error);
    }
    tracing::info!(
        "Holding lock of cluster {} as {} (token {})",
        cluster,
        topom.admin_addr,
        topom.token
    );

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to wait for interrupt: {}", error);
    }

    let released = store.release().await;
    store.close().await?;
    released
}

async fn collect_topology(store: &MetaStore, cluster: &str) -> Result<TopologyDump> {
    Ok(TopologyDump {
        cluster: cluster.to_string(),
        slots: store.list_slot_mappings().await?,
        proxies: store.list_proxy().await?,
        groups: store.list_group().await?,
    })
}

async fn dump_topology(cfg: &Config, cluster: &str) -> Result<()> {
    let store = MetaStore::connect(&cfg.coordinator_builder()).await?;

    if let Err(error) = store.acquire(cluster, &leader_descriptor(cfg, cluster)).await {
        store.close().await?;
        return Err(error);
    }

    let dump = collect_topology(&store, cluster).await;
    let released = store.release().await;
    store.close().await?;

    let dump = dump?;
    released?;

    let assigned = dump.slots.len();
    if assigned < cfg.product.max_slots as usize {
        tracing::info!("{} of {} slots are assigned", assigned, cfg.product.max_slots);
    }
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}

async fn remove_lock(cfg: &Config, cluster: &str, force: bool) -> Result<()> {
    if !force {
        return Err(MetaError::Config("remove-lock requires --force".to_string()));
    }

    let builder = cfg.coordinator_builder();
    let paths = TopologyPaths::new(&builder.resolve_root(), cluster)?;
    let client = builder.build().await?;

    let removed = client.delete(&paths.lock_path()).await;
    client.close().await?;
    removed?;

    tracing::warn!("Removed lock {}", paths.lock_path());
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slotwarden=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let cfg = match Config::from_file(&cli.conf) {
        Ok(c) => c,
        Err(error) => {
            tracing::error!("Failed to load config: {}", error);
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Commands::Leader { cluster } => show_leader(&cfg, &cluster_name(&cfg, cluster)).await,
        Commands::Hold { cluster } => hold_lock(&cfg, &cluster_name(&cfg, cluster)).await,
        Commands::Dump { cluster } => dump_topology(&cfg, &cluster_name(&cfg, cluster)).await,
        Commands::RemoveLock { cluster, force } => {
            remove_lock(&cfg, &cluster_name(&cfg, cluster), force).await
        }
    };

    if let Err(error) = outcome {
        tracing::error!("Command failed: {}", error);
        std::process::exit(1);
    }
}
