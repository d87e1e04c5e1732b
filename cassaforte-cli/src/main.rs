use anyhow::{Context, Result};
use cassaforte_client::{CassandraClient, ClientConfig};
use cassaforte_proto::{
    AuthenticationRequest, Compression, ConsistencyLevel, CqlResult, CqlResultType,
    DEFAULT_CQL_VERSION, DEFAULT_PORT,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod table;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Table format (default)
    Table,
    /// Pretty JSON
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    LocalQuorum,
    EachQuorum,
    All,
}

impl From<Consistency> for ConsistencyLevel {
    fn from(level: Consistency) -> Self {
        match level {
            Consistency::Any => ConsistencyLevel::Any,
            Consistency::One => ConsistencyLevel::One,
            Consistency::Two => ConsistencyLevel::Two,
            Consistency::Three => ConsistencyLevel::Three,
            Consistency::Quorum => ConsistencyLevel::Quorum,
            Consistency::LocalQuorum => ConsistencyLevel::LocalQuorum,
            Consistency::EachQuorum => ConsistencyLevel::EachQuorum,
            Consistency::All => ConsistencyLevel::All,
        }
    }
}

#[derive(Parser)]
#[command(name = "cassaforte")]
#[command(about = "Cassandra RPC command-line client", long_about = None)]
struct Cli {
    /// Node to connect to
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// RPC port of the node
    #[arg(short, long, global = true, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// CQL version requested when connecting
    #[arg(long, global = true, default_value = DEFAULT_CQL_VERSION)]
    cql_version: String,

    /// Keyspace to use for the session
    #[arg(short, long, global = true)]
    keyspace: Option<String>,

    /// Log in with this user before running the command
    #[arg(short, long, global = true, requires = "password")]
    username: Option<String>,

    #[arg(long, global = true, requires = "username")]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cluster name, API version, partitioner and snitch
    Describe,
    /// List keyspaces and their column families
    Keyspaces,
    /// Show the token ranges of a keyspace
    Ring {
        /// Keyspace name
        keyspace: String,
    },
    /// Show which nodes report which schema version
    SchemaVersions,
    /// Execute a CQL statement
    Cql {
        /// CQL statement
        query: String,
        /// Use the CQL 3 entry point
        #[arg(long)]
        cql3: bool,
        /// Consistency level for CQL 3 statements
        #[arg(short, long, value_enum, default_value = "one")]
        consistency: Consistency,
        /// Output format (table, json)
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut client = connect(&cli)?;

    match cli.command {
        Commands::Describe => {
            let rows = vec![
                ("Cluster", client.describe_cluster_name()?),
                ("API version", client.describe_version()?),
                ("Partitioner", client.describe_partitioner()?),
                ("Snitch", client.describe_snitch()?),
            ];
            println!("{}", table::format_properties(&rows));
        }

        Commands::Keyspaces => {
            let keyspaces = client
                .describe_keyspaces()
                .context("Failed to list keyspaces")?;
            println!("{}", table::format_keyspaces(&keyspaces));
        }

        Commands::Ring { keyspace } => {
            let ranges = client
                .describe_ring(keyspace.clone())
                .with_context(|| format!("Failed to describe ring of '{}'", keyspace))?;
            println!("{}", table::format_ring(&ranges));
        }

        Commands::SchemaVersions => {
            let versions = client
                .describe_schema_versions()
                .context("Failed to read schema versions")?;
            println!("{}", table::format_schema_versions(&versions));
            if versions.len() > 1 {
                println!("Schema disagreement: {} versions in the cluster", versions.len());
            }
        }

        Commands::Cql {
            query,
            cql3,
            consistency,
            output,
        } => {
            let result = if cql3 {
                client.execute_cql3_query(
                    query.into_bytes(),
                    Compression::None,
                    consistency.into(),
                )
            } else {
                client.execute_cql(&query)
            }
            .context("Failed to execute statement")?;

            print_result(&result, output)?;
        }
    }

    client.close();
    Ok(())
}

/// Open a client and set up the session from the global options
fn connect(cli: &Cli) -> Result<CassandraClient> {
    let config = ClientConfig::new(cli.host.clone())
        .with_port(cli.port)
        .with_cql_version(cli.cql_version.clone());
    debug!("Connecting to {}", config.endpoint_uri());

    let mut client = CassandraClient::with_config(config)
        .with_context(|| format!("Failed to connect to {}:{}", cli.host, cli.port))?;

    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        client
            .login(AuthenticationRequest::password(username.clone(), password.clone()))
            .context("Login failed")?;
    }
    if let Some(keyspace) = &cli.keyspace {
        client
            .set_keyspace(keyspace.clone())
            .with_context(|| format!("Failed to use keyspace '{}'", keyspace))?;
    }
    Ok(client)
}

fn print_result(result: &CqlResult, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Table => match result.result_type() {
            CqlResultType::Rows => {
                println!("{}", table::format_rows(&result.rows));
                println!();
                println!("Rows: {}", result.rows.len());
            }
            CqlResultType::Int => println!("{}", result.num),
            CqlResultType::Void => println!("OK"),
        },
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&table::result_to_json(result))?);
        }
    }
    Ok(())
}
