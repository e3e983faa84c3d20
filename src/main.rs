//! tidb-query - run SQL against TiDB through a connection pool.

mod cli;

use cli::Cli;
use tidb_query::config::Config;
use tidb_query::{logging, ExecutorError, QueryExecutor, Result};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        match e.server_code() {
            Some(code) => error!(code = %code, "{}: {}", e.category(), e),
            None => error!("{}: {}", e.category(), e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    info!("Connection: {}", config.pool.display_string());

    let executor = QueryExecutor::from_config(&config)?;
    let params = cli.params();
    if let Some(params) = &params {
        debug!("Binding parameters: {}", cli::display_params(params));
    }

    let outcome = match params {
        Some(params) if cli.limited => {
            executor
                .prepare_with(&cli.sql, &params, executor.limits())
                .await
        }
        Some(params) => executor.prepare(&cli.sql, &params).await,
        None => executor.execute(&cli.sql, cli.limited).await,
    };
    executor.close().await;

    let result = outcome?;
    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    }
    .map_err(|e| ExecutorError::internal(format!("Failed to encode result: {e}")))?;

    println!("{json}");
    Ok(())
}

/// Resolves pool settings with precedence:
/// 1. CLI arguments (highest)
/// 2. Config file
/// 3. Environment variables
fn resolve_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config_path();
    debug!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    if let Some(overrides) = cli.to_pool_config()? {
        config.pool.merge(&overrides);
    }
    config.pool.apply_env_defaults();

    Ok(config)
}
