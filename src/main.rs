use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ringmaster::{
    DeviceAddRequest, DeviceWeightUpdate, NodeAddRequest, RingAddRequest, RingBuilder, Settings,
    Topology,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ringmaster")]
#[command(about = "Manage storage cluster topology and build its rings")]
struct Cli {
    /// JSON settings file
    #[arg(long, env = "RINGMASTER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of the store files (overrides the settings file)
    #[arg(long, env = "RINGMASTER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Store file name stem (overrides the settings file)
    #[arg(long, env = "RINGMASTER_DB_NAME")]
    db_name: Option<String>,

    /// Open the store read-only
    #[arg(long, env = "RINGMASTER_READ_ONLY")]
    read_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(subcommand)]
    Cluster(ClusterCommand),
    #[command(subcommand)]
    Ring(RingCommand),
    #[command(subcommand)]
    Node(NodeCommand),
    #[command(subcommand)]
    Device(DeviceCommand),
}

#[derive(Subcommand)]
enum ClusterCommand {
    Create,
    Info { id: String },
    List,
    Delete { id: String },
    /// Print the full cluster tree
    Topology { id: String },
    /// Run swift-ring-builder for every ring without a builder file
    Build {
        id: String,
        /// Print the builder commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum RingCommand {
    Add {
        #[arg(long)]
        cluster: String,
        #[arg(long)]
        name: String,
    },
    Info { id: String },
    List,
    Delete { id: String },
}

#[derive(Subcommand)]
enum NodeCommand {
    Add(NodeAddArgs),
    Info { id: String },
    List,
    Delete { id: String },
}

#[derive(Args)]
struct NodeAddArgs {
    #[arg(long)]
    ring: String,
    #[arg(long)]
    ip: String,
    #[arg(long)]
    port: u16,
    #[arg(long)]
    region: Option<u32>,
    #[arg(long)]
    zone: Option<u32>,
    #[arg(long)]
    replication_ip: Option<String>,
    #[arg(long)]
    replication_port: Option<u16>,
}

#[derive(Subcommand)]
enum DeviceCommand {
    Add {
        #[arg(long)]
        node: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        meta: String,
        #[arg(long, default_value_t = 0)]
        weight: u64,
    },
    Info { id: String },
    List,
    Delete { id: String },
    /// Change the current and/or target weight
    Weight {
        id: String,
        #[arg(long)]
        current: Option<u64>,
        #[arg(long)]
        target: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = Some(dir);
    }
    if let Some(name) = cli.db_name {
        settings.db_name = name;
    }
    settings.read_only |= cli.read_only;

    let topology = Topology::open(settings.store_config())
        .await
        .context("Failed to open the topology store")?;
    let result = run(&topology, &settings, cli.command).await;
    topology
        .close()
        .await
        .context("Failed to close the topology store")?;
    result
}

async fn run(topology: &Topology, settings: &Settings, command: Command) -> Result<()> {
    match command {
        Command::Cluster(command) => match command {
            ClusterCommand::Create => print_json(&topology.create_cluster().await?),
            ClusterCommand::Info { id } => print_json(&topology.cluster_info(&id).await?),
            ClusterCommand::List => print_json(&topology.list_clusters().await?),
            ClusterCommand::Delete { id } => {
                topology.delete_cluster(&id).await?;
                Ok(())
            }
            ClusterCommand::Topology { id } => print_json(&topology.cluster_topology(&id).await?),
            ClusterCommand::Build { id, dry_run } => {
                let tree = topology
                    .cluster_topology(&id)
                    .await
                    .with_context(|| format!("Failed to read cluster {id}"))?;
                let builder = RingBuilder::new(settings.builder.clone());
                if dry_run {
                    let binary = builder.settings().binary.display().to_string();
                    for plan in builder.plan(&tree) {
                        for args in plan.commands {
                            println!("{} {}", binary, args.join(" "));
                        }
                    }
                    return Ok(());
                }
                print_json(&builder.build_cluster(&tree).await?)
            }
        },
        Command::Ring(command) => match command {
            RingCommand::Add { cluster, name } => {
                print_json(&topology.add_ring(RingAddRequest::new(cluster, name)).await?)
            }
            RingCommand::Info { id } => print_json(&topology.ring_info(&id).await?),
            RingCommand::List => print_json(&topology.list_rings().await?),
            RingCommand::Delete { id } => {
                topology.delete_ring(&id).await?;
                Ok(())
            }
        },
        Command::Node(command) => match command {
            NodeCommand::Add(args) => {
                let req = NodeAddRequest {
                    ring_id: args.ring,
                    region: args.region,
                    zone: args.zone,
                    ip: args.ip,
                    port: args.port,
                    replication_ip: args.replication_ip,
                    replication_port: args.replication_port,
                };
                print_json(&topology.add_node(req).await?)
            }
            NodeCommand::Info { id } => print_json(&topology.node_info(&id).await?),
            NodeCommand::List => print_json(&topology.list_nodes().await?),
            NodeCommand::Delete { id } => {
                topology.delete_node(&id).await?;
                Ok(())
            }
        },
        Command::Device(command) => match command {
            DeviceCommand::Add {
                node,
                name,
                meta,
                weight,
            } => {
                let req = DeviceAddRequest::new(node, name, weight).with_meta(meta);
                print_json(&topology.add_device(req).await?)
            }
            DeviceCommand::Info { id } => print_json(&topology.device_info(&id).await?),
            DeviceCommand::List => print_json(&topology.list_devices().await?),
            DeviceCommand::Delete { id } => {
                topology.delete_device(&id).await?;
                Ok(())
            }
            DeviceCommand::Weight {
                id,
                current,
                target,
            } => {
                let update = DeviceWeightUpdate { current, target };
                print_json(&topology.set_device_weight(&id, update).await?)
            }
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{out}");
    Ok(())
}
