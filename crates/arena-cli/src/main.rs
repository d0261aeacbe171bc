//! Arena CLI - run object storage benchmarks from a compute cluster.

mod commands;

use std::path::PathBuf;

use arena_control::Endpoint;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arena")]
#[command(about = "Measure object storage throughput from a compute cluster")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = arena_control::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the node inventory of the cluster
    Nodes,

    /// Show the object storage region in use
    Region,

    /// Obtain temporary object storage keys
    Credentials,

    /// Apply a multi-document YAML manifest
    Apply {
        /// Manifest file
        file: PathBuf,

        /// Namespace for documents without one (overrides arena.toml)
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Distributed Warp benchmarks
    Warp {
        #[command(subcommand)]
        command: WarpCommands,
    },

    /// List objects in a bucket
    Objects {
        /// Bucket name
        bucket: String,

        /// Only keys starting with this prefix
        #[arg(short, long, default_value = "")]
        prefix: String,
    },

    /// Create, empty and delete buckets
    Buckets {
        #[command(subcommand)]
        command: BucketCommands,
    },

    /// Organisation access policies
    Policies {
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// Single-object upload and download bandwidth tests
    Transfer {
        #[command(subcommand)]
        command: TransferCommands,
    },

    /// Shard download benchmark from this host
    Throughput {
        #[command(subcommand)]
        command: ThroughputCommands,
    },
}

#[derive(Subcommand)]
enum WarpCommands {
    /// Start a benchmark against a bucket
    Run {
        /// Bucket name
        bucket: String,

        /// Wait for the benchmark to finish and print its output
        #[arg(short, long)]
        watch: bool,
    },

    /// Show the status of a benchmark job
    Status {
        /// Job name, e.g. warp-01j9x2ab
        job: String,
    },

    /// Wait for a benchmark job to finish and print its output
    Watch {
        /// Job name, e.g. warp-01j9x2ab
        job: String,
    },
}

#[derive(Subcommand)]
enum BucketCommands {
    /// List buckets
    List,

    /// Create a bucket in the session's region if it does not exist
    Create {
        /// Bucket name
        bucket: String,
    },

    /// Delete a bucket
    Delete {
        /// Bucket name
        bucket: String,

        /// Delete all objects first
        #[arg(short, long)]
        force: bool,
    },

    /// Delete all objects in a bucket
    Empty {
        /// Bucket name
        bucket: String,
    },

    /// Bucket policies
    Policy {
        #[command(subcommand)]
        command: BucketPolicyCommands,
    },
}

#[derive(Subcommand)]
enum BucketPolicyCommands {
    /// Show the policy of a bucket
    Get {
        /// Bucket name
        bucket: String,
    },

    /// Set the policy of a bucket from a JSON file
    Put {
        /// Bucket name
        bucket: String,

        /// Policy document
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// List organisation policies
    List,

    /// Create or update a policy from a JSON file
    Apply {
        /// Policy document
        file: PathBuf,
    },

    /// Delete a policy by name
    Delete {
        /// Policy name
        name: String,
    },
}

#[derive(Subcommand)]
enum TransferCommands {
    /// Upload a zero-filled object to benchmark/<size>GB
    Upload {
        /// Bucket name
        bucket: String,

        /// Object size in GB (overrides arena.toml)
        #[arg(short, long)]
        size_gb: Option<u64>,
    },

    /// Download an object to a local directory
    Download {
        /// Bucket name
        bucket: String,

        /// Object key
        key: String,

        /// Directory to write to (overrides arena.toml)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ThroughputCommands {
    /// Download shards from a bucket with concurrent workers
    Run {
        /// Bucket name
        bucket: String,

        /// Number of workers (overrides arena.toml)
        #[arg(short, long)]
        workers: Option<u32>,

        /// Compare endpoints in turn, e.g. lota,caios
        #[arg(short, long, value_delimiter = ',')]
        endpoints: Vec<Endpoint>,

        /// Write the raw report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarise a saved report
    Summarize {
        /// Report file written by `throughput run`
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result: Result<(), anyhow::Error> = match cli.command {
        Commands::Nodes => commands::cluster::nodes(&config).await,
        Commands::Region => commands::cluster::region(&config).await,
        Commands::Credentials => commands::credentials::show(&config).await,
        Commands::Apply { file, namespace } => {
            commands::cluster::apply(&config, &file, namespace.as_deref()).await
        }
        Commands::Warp { command } => match command {
            WarpCommands::Run { bucket, watch } => commands::warp::run(&config, &bucket, watch).await,
            WarpCommands::Status { job } => commands::warp::status(&config, &job).await,
            WarpCommands::Watch { job } => commands::warp::watch(&config, &job).await,
        },
        Commands::Objects { bucket, prefix } => commands::storage::objects(&config, &bucket, &prefix).await,
        Commands::Buckets { command } => match command {
            BucketCommands::List => commands::buckets::list(&config).await,
            BucketCommands::Create { bucket } => commands::buckets::create(&config, &bucket).await,
            BucketCommands::Delete { bucket, force } => {
                commands::buckets::delete(&config, &bucket, force).await
            }
            BucketCommands::Empty { bucket } => commands::buckets::empty(&config, &bucket).await,
            BucketCommands::Policy { command } => match command {
                BucketPolicyCommands::Get { bucket } => commands::buckets::get_policy(&config, &bucket).await,
                BucketPolicyCommands::Put { bucket, file } => {
                    commands::buckets::put_policy(&config, &bucket, &file).await
                }
            },
        },
        Commands::Policies { command } => match command {
            PolicyCommands::List => commands::credentials::list_policies(&config).await,
            PolicyCommands::Apply { file } => commands::credentials::apply_policy(&config, &file).await,
            PolicyCommands::Delete { name } => commands::credentials::delete_policy(&config, &name).await,
        },
        Commands::Transfer { command } => match command {
            TransferCommands::Upload { bucket, size_gb } => {
                commands::transfer::upload(&config, &bucket, size_gb).await
            }
            TransferCommands::Download { bucket, key, dir } => {
                commands::transfer::download(&config, &bucket, &key, dir).await
            }
        },
        Commands::Throughput { command } => match command {
            ThroughputCommands::Run {
                bucket,
                workers,
                endpoints,
                output,
            } => commands::throughput::run(&config, &bucket, workers, &endpoints, output.as_deref()).await,
            ThroughputCommands::Summarize { file } => commands::throughput::summarize(&file).await,
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
