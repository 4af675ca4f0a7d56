use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::warn;

use nodestore_core::config::Config;
use nodestore_core::cpu::CpuMap;
use nodestore_store::{CpuOp, NewNode, NodeView, PartialNodes, PodView, Store, TlsMaterial};

use crate::display::{EngineInfoRow, NodeRow, PodRow};
use crate::logging::{self, LogFormat};
use crate::output::{self, OutputFormat};

#[derive(Parser)]
#[command(
    name = "nodestore",
    version,
    about = "Node and pod records, CPU ledger and engine clients over etcd"
)]
struct Cli {
    /// Path to a nodestore TOML config (defaults apply when omitted)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Output format: table, json
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: String,

    /// Log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    /// More log output (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage pods
    Pod {
        #[command(subcommand)]
        action: PodCmd,
    },
    /// Manage nodes and their CPU shares
    Node {
        #[command(subcommand)]
        action: NodeCmd,
    },
    /// Validate the config file and print the effective settings
    CheckConfig,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum PodCmd {
    /// Create or overwrite a pod
    Add {
        name: String,
        /// Free-text description
        #[arg(long, default_value = "")]
        desc: String,
    },
    /// Show one pod
    Get { name: String },
    /// List all pods
    List,
}

#[derive(Subcommand)]
enum NodeCmd {
    /// Register a node and seed its CPU shares from the engine
    Add {
        pod: String,
        name: String,
        /// Engine endpoint, tcp://host:port
        endpoint: String,
        /// CA certificate (PEM) for the engine's TLS endpoint
        #[arg(long, requires_all = ["cert", "key"])]
        ca: Option<PathBuf>,
        /// Client certificate (PEM)
        #[arg(long, requires_all = ["ca", "key"])]
        cert: Option<PathBuf>,
        /// Client private key (PEM)
        #[arg(long, requires_all = ["ca", "cert"])]
        key: Option<PathBuf>,
        /// Mark the node as public
        #[arg(long)]
        public: bool,
    },
    /// Show one node
    Get { pod: String, name: String },
    /// List nodes of one pod, or of all pods
    List {
        #[arg(long)]
        pod: Option<String>,
    },
    /// Add or subtract CPU shares, e.g. `update-cpu dev n1 sub 0:5,1:5`
    UpdateCpu {
        pod: String,
        name: String,
        /// add, +, sub or -
        #[arg(allow_hyphen_values = true)]
        op: String,
        /// label:shares pairs joined by commas
        delta: String,
    },
    /// Query the node's engine
    Info { pod: String, name: String },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.log_format, cli.verbose)?;
    let out_fmt = OutputFormat::from_str_arg(&cli.output);

    match cli.command {
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::CheckConfig => cmd_check_config(cli.config.as_deref()),
        Commands::Pod { action } => {
            let config = load_config(cli.config.as_deref())?;
            run_store_command(async move {
                let store = connect(&config).await?;
                cmd_pod(&store, action, out_fmt).await
            })
        }
        Commands::Node { action } => {
            let config = load_config(cli.config.as_deref())?;
            run_store_command(async move {
                let store = connect(&config).await?;
                cmd_node(&store, action, out_fmt).await
            })
        }
    }
}

/// Run an async command on a fresh multi-threaded runtime.
fn run_store_command<F, T>(f: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_context(|| "Failed to create tokio runtime")?;
    runtime.block_on(f)
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

async fn connect(config: &Config) -> Result<Store> {
    Store::connect(config).await.with_context(|| {
        format!(
            "Failed to connect to etcd at {}",
            config.etcd.endpoints.join(",")
        )
    })
}

fn cmd_completions(shell: clap_complete::Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "nodestore", &mut std::io::stdout());
    Ok(())
}

fn cmd_check_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    println!("etcd endpoints: {}", config.etcd.endpoints.join(", "));
    println!("key root: {}", config.etcd.root);
    match &config.docker.cert_path {
        Some(dir) => println!("engine TLS: {}", dir.display()),
        None => println!("engine TLS: off"),
    }
    println!("engine API version: {}", config.docker.api_version);
    println!("lock ttl: {}s", config.lock.ttl_secs);
    match config.lock.acquire_timeout_secs {
        Some(0) => println!("lock wait: try once"),
        Some(secs) => println!("lock wait: {}s", secs),
        None => println!("lock wait: unbounded"),
    }
    println!("cpu shares per core: {}", config.node.cpu_shares_per_core);
    Ok(())
}

async fn cmd_pod(store: &Store, action: PodCmd, out_fmt: OutputFormat) -> Result<()> {
    match action {
        PodCmd::Add { name, desc } => {
            let pod = store
                .add_pod(&name, &desc)
                .await
                .with_context(|| format!("Failed to add pod {}", name))?;
            let view = PodView::from(&pod);
            println!("{}", output::render_one(&PodRow::from(&view), &view, out_fmt)?);
        }
        PodCmd::Get { name } => {
            let pod = store
                .get_pod(&name)
                .await
                .with_context(|| format!("Failed to read pod {}", name))?;
            let view = PodView::from(&pod);
            println!("{}", output::render_one(&PodRow::from(&view), &view, out_fmt)?);
        }
        PodCmd::List => {
            let pods = store.get_all_pods().await.context("Failed to list pods")?;
            let views: Vec<PodView> = pods.iter().map(PodView::from).collect();
            let rows: Vec<PodRow> = views.iter().map(PodRow::from).collect();
            println!("{}", output::render_list(&rows, &views, out_fmt)?);
        }
    }
    Ok(())
}

async fn cmd_node(store: &Store, action: NodeCmd, out_fmt: OutputFormat) -> Result<()> {
    match action {
        NodeCmd::Add {
            pod,
            name,
            endpoint,
            ca,
            cert,
            key,
            public,
        } => {
            let tls = match (ca, cert, key) {
                (Some(ca), Some(cert), Some(key)) => Some(TlsMaterial {
                    ca: read_pem(&ca)?,
                    cert: read_pem(&cert)?,
                    key: read_pem(&key)?,
                }),
                _ => None,
            };
            let node = store
                .add_node(NewNode {
                    name: name.clone(),
                    endpoint,
                    podname: pod.clone(),
                    tls,
                    public,
                })
                .await
                .with_context(|| format!("Failed to add node {}/{}", pod, name))?;
            let view = NodeView::from_node(&node).await;
            println!("{}", output::render_one(&NodeRow::from(&view), &view, out_fmt)?);
        }
        NodeCmd::Get { pod, name } => {
            let node = store
                .get_node(&pod, &name)
                .await
                .with_context(|| format!("Failed to read node {}/{}", pod, name))?;
            let view = NodeView::from_node(&node).await;
            println!("{}", output::render_one(&NodeRow::from(&view), &view, out_fmt)?);
        }
        NodeCmd::List { pod } => {
            let listed = match &pod {
                Some(pod) => store.get_nodes_by_pod(pod).await,
                None => store.get_all_nodes().await,
            };
            let (nodes, failure) = match listed {
                Ok(nodes) => (nodes, None),
                Err(PartialNodes { nodes, error }) => (nodes, Some(error)),
            };

            let mut views = Vec::with_capacity(nodes.len());
            for node in &nodes {
                views.push(NodeView::from_node(node).await);
            }
            let rows: Vec<NodeRow> = views.iter().map(NodeRow::from).collect();
            println!("{}", output::render_list(&rows, &views, out_fmt)?);

            if let Some(error) = failure {
                warn!(loaded = nodes.len(), "Node listing incomplete");
                return Err(error).context("Failed to list nodes");
            }
        }
        NodeCmd::UpdateCpu {
            pod,
            name,
            op,
            delta,
        } => {
            let op: CpuOp = op.parse()?;
            let delta: CpuMap = delta.parse()?;
            let node = store
                .update_node_cpu(&pod, &name, &delta, op)
                .await
                .with_context(|| format!("Failed to update cpu of {}/{}", pod, name))?;
            let view = NodeView::from_node(&node).await;
            println!("{}", output::render_one(&NodeRow::from(&view), &view, out_fmt)?);
        }
        NodeCmd::Info { pod, name } => {
            let info = store
                .node_info(&pod, &name)
                .await
                .with_context(|| format!("Failed to query engine of {}/{}", pod, name))?;
            println!(
                "{}",
                output::render_one(&EngineInfoRow::from(&info), &info, out_fmt)?
            );
        }
    }
    Ok(())
}

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read PEM file: {}", path.display()))
}
