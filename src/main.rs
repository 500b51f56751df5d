//! query-server-mcp: MCP server for read-only SQL queries over stdio
//!
//! Exposes a SQLite database to MCP clients through the `execute_sql` tool
//! and the `sqlite://schema` resource.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use query_server_mcp::config::{self, Config, LogFormat};
use query_server_mcp::error::CapabilityKind;
use query_server_mcp::logging::LogSink;
use query_server_mcp::mcp::{
    Capabilities, InitializeHandler, JsonRpcDispatcher, McpServer, PromptChain, Resource,
    ResourceChain, ServerInfo, Tool, ToolChain,
};
use query_server_mcp::resources::SchemaResource;
use query_server_mcp::tools::ExecuteSqlTool;

/// How long to wait for in-flight tool calls once the serve loop has ended.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// MCP server for read-only SQL queries.
///
/// Reads JSON-RPC 2.0 messages from stdin, one per line, and writes responses
/// to stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "query-server-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Path to the SQLite database (overrides `database.path`)
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber. Stdout carries protocol frames, so
/// logs always go to stderr.
fn init_tracing(level: Level, format: LogFormat) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Opens the database and assembles the dispatcher.
fn build_dispatcher(cfg: &Config, database: &Path) -> rusqlite::Result<JsonRpcDispatcher> {
    let version = cfg.server_version();

    let tools: Vec<Box<dyn Tool>> = vec![Box::new(ExecuteSqlTool::open(
        database,
        version.clone(),
        cfg.database.max_rows,
    )?)];
    let resources: Vec<Box<dyn Resource>> = vec![Box::new(SchemaResource::open(database)?)];

    let capabilities = Capabilities {
        prompts: Arc::new(PromptChain::empty(CapabilityKind::Prompt)),
        resources: Arc::new(ResourceChain::new(
            CapabilityKind::Resource,
            resources,
            &LogSink::new("resources"),
        )),
        tools: Arc::new(ToolChain::new(CapabilityKind::Tool, tools, &LogSink::new("tools"))),
    };

    let initialize = InitializeHandler::new(
        ServerInfo {
            name: cfg.server.name.clone(),
            version,
        },
        cfg.server.protocol_version.clone(),
    );

    Ok(
        JsonRpcDispatcher::build(initialize, &capabilities, cfg.limits.tool_timeout())
            .with_max_message_bytes(cfg.limits.max_message_bytes),
    )
}

/// Entry point for the query-server-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(database) = args.database {
        cfg.database.path = Some(database);
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level, cfg.logging.format);

    let Some(database) = cfg.database.path.clone() else {
        eprintln!("Configuration error: no database path; set database.path or pass --database");
        if config_path.is_none() {
            if let Some(default_path) = config::default_config_path() {
                eprintln!("\nConfig is read from: {}", default_path.display());
            }
        }
        return ExitCode::FAILURE;
    };

    info!(
        version = %cfg.server_version(),
        database = %database.display(),
        "Starting query-server-mcp server"
    );

    let dispatcher = match build_dispatcher(&cfg, &database) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!(error = %e, database = %database.display(), "Failed to open database");
            return ExitCode::FAILURE;
        }
    };

    let mut server = McpServer::new(dispatcher);

    info!("MCP server ready, waiting for client connection...");

    // Run the server
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(server.run());

    // Tool calls that outlived their deadline may still be on the blocking
    // pool; don't let them hold the process open.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn cli_flags_override_config_level() {
        assert_eq!(get_log_level(0, false, "debug"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
        assert_eq!(get_log_level(2, false, "error"), Level::DEBUG);
        assert_eq!(get_log_level(3, true, "trace"), Level::ERROR);
    }

    #[test]
    fn parses_database_flag() {
        let args = Args::parse_from([
            "query-server-mcp",
            "cfg.json",
            "--database",
            "db.sqlite",
            "-vv",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("cfg.json")));
        assert_eq!(args.database, Some(PathBuf::from("db.sqlite")));
        assert_eq!(args.verbose, 2);
    }
}
