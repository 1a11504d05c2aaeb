//! Script runner for tableforge.
//!
//! Run a file: `cargo run -p tableforge-console -- schema.sql [--stop-on-error]`
//! Read stdin: `cat schema.sql | cargo run -p tableforge-console`
//! Repair the registry: `cargo run -p tableforge-console -- --resync`

use std::io::Read;
use tableforge::{ensure_database_exists, init_tracing, CoreSettings, CoreState, ScriptOptions, SqlService, TableService};

/// History and registry owner for statements run from here.
const CONSOLE_USER: &str = "console";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("tableforge=info,tableforge_console=info");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let settings = CoreSettings::from_env()?;
    ensure_database_exists(&database_url).await?;
    let state = CoreState::connect(&database_url, settings).await?;

    if args.iter().any(|a| a == "--resync") {
        let report = TableService::new(state).resync_registry().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let options = ScriptOptions {
        stop_on_error: args.iter().any(|a| a == "--stop-on-error"),
    };
    let script = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let results = SqlService::new(state).execute_script(&script, CONSOLE_USER, options).await?;
    let failed = results.iter().filter(|r| !r.success).count();
    tracing::info!(statements = results.len(), failed, "script finished");
    println!("{}", serde_json::to_string_pretty(&results)?);
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
