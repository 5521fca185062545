//! xclient CLI
//!
//! Runs one SQL statement against an X Protocol server and prints every
//! result part as JSON lines.

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};
use xclient::{AuthMethod, Resultset, Session, SessionConfig, SslMode};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Auth {
    Mysql41,
    Sha256Memory,
    Plain,
}

/// xclient CLI
#[derive(Parser, Debug)]
#[command(name = "xclient-cli")]
#[command(about = "Run a statement over the MySQL X Protocol")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server X Protocol port
    #[arg(short = 'P', long, default_value_t = xclient::config::DEFAULT_PORT)]
    port: u16,

    /// Account name
    #[arg(short, long, default_value = "root")]
    user: String,

    /// Account password
    #[arg(short, long, default_value = "")]
    password: String,

    /// Default schema
    #[arg(short, long)]
    schema: Option<String>,

    /// Authentication mechanism
    #[arg(long, value_enum, default_value = "mysql41")]
    auth: Auth,

    /// JSON session config; replaces the connection flags above
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Print rows as arrays instead of objects
    #[arg(long)]
    raw: bool,

    /// SQL statement to run
    sql: String,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,xclient=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("xclient CLI v{}", xclient::VERSION);

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => config_from_args(&args),
    };

    let session = match Session::connect(config) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Failed to open session: {}", e);
            std::process::exit(1);
        }
    };

    let code = match run(&session, &args) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{}", e);
            1
        }
    };

    if let Err(e) = session.close() {
        tracing::warn!("Error closing session: {}", e);
    }
    std::process::exit(code);
}

fn load_config(path: &std::path::Path) -> xclient::Result<SessionConfig> {
    let text = std::fs::read_to_string(path)?;
    SessionConfig::from_json(&text)
}

fn config_from_args(args: &Args) -> SessionConfig {
    let mut builder = SessionConfig::builder()
        .host(&args.host)
        .port(args.port)
        .user(&args.user)
        .password(&args.password)
        .ssl_mode(SslMode::Disabled)
        .auth_method(match args.auth {
            Auth::Mysql41 => AuthMethod::Mysql41,
            Auth::Sha256Memory => AuthMethod::Sha256Memory,
            Auth::Plain => AuthMethod::Plain,
        });
    if let Some(schema) = &args.schema {
        builder = builder.schema(schema);
    }
    builder.build()
}

fn run(session: &Session, args: &Args) -> xclient::Result<()> {
    let mut result = session.sql(&args.sql)?;
    loop {
        print_part(&mut result, args.raw)?;
        if !result.advance_to_next_result()? {
            break;
        }
    }
    Ok(())
}

fn print_part(result: &mut Resultset, raw: bool) -> xclient::Result<()> {
    if result.has_data() {
        for row in result.all(raw)? {
            println!("{}", row);
        }
        eprintln!("{} rows in set", result.fetched_row_count());
    } else {
        eprintln!("Query OK, {} rows affected", result.affected_rows());
    }

    if let Some(id) = result.auto_increment_value() {
        eprintln!("Auto increment value: {}", id);
    }
    for warning in result.warnings() {
        eprintln!("{} ({}): {}", warning.level.as_str(), warning.code, warning.message);
    }
    if let Some(time) = result.execution_time() {
        eprintln!("Execution time: {:.3}s", time.as_secs_f64());
    }
    Ok(())
}
