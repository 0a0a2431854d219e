//! bookgate - command-line front end for the library app's session layer.
//!
//! Logs in and out, shows who is logged in, registers accounts, checks
//! whether a route would be allowed, and makes authenticated GET calls.

mod coordinator;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookgate_core::api::RegisterRequest;
use bookgate_core::{ApiClient, Config, NavigationGuard, Role, SessionHandle, SessionStore};

use coordinator::Coordinator;

const USAGE: &str = "\
Usage: bookgate <command>

Commands:
  login [username]                 Log in (password is prompted)
  logout                           Forget the current session
  whoami                           Refresh and show the logged-in identity
  register <username> <email> [role]
                                   Create an account (password is prompted)
  visit <path>                     Show whether navigating to <path> is allowed
  get <path>                       Authenticated GET, prints the JSON response";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug). When a
/// cache directory is available, logs are also written to daily files there.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), "bookgate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({}), using defaults", e);
            Config::default()
        }
    };

    let log_guard = init_tracing(&config);
    info!(base_url = %config.base_url, storage = ?config.storage, "bookgate starting");

    let storage = config.open_storage().context("Failed to open session storage")?;
    let session = SessionHandle::hydrate(storage);
    let client = ApiClient::new(&config, session.clone())?;
    let store = SessionStore::new(session.clone(), Arc::new(client.clone()));
    let guard = NavigationGuard::library();
    let mut coordinator = Coordinator::new(client.subscribe(), "/");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("");

    let result = match command {
        "login" => login(&store, &mut config, args.get(1).cloned()).await,
        "logout" => {
            store.logout();
            println!("Logged out.");
            Ok(())
        }
        "whoami" => whoami(&store).await,
        "register" => register(&store, &args[1..]).await,
        "visit" => match args.get(1) {
            Some(path) => {
                let from = coordinator.location().to_string();
                guard.before_each(path, &from, &session, &mut coordinator);
                Ok(())
            }
            None => Err(anyhow::anyhow!("visit needs a path\n\n{}", USAGE)),
        },
        "get" => match args.get(1) {
            Some(path) => get(&client, path).await,
            None => Err(anyhow::anyhow!("get needs a path\n\n{}", USAGE)),
        },
        _ => {
            println!("{}", USAGE);
            Ok(())
        }
    };

    // Rejections seen by any call above become navigation here.
    coordinator.drain_events();

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        // Flush file logs before exiting.
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

async fn login(store: &SessionStore, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match (username, config.last_username.clone()) {
        (Some(given), _) => given,
        (None, Some(last)) if !last.is_empty() => {
            let input = prompt(&format!("Username [{}]: ", last))?;
            if input.is_empty() {
                last
            } else {
                input
            }
        }
        (None, _) => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    println!("Authenticating...");
    store.login(&username, &password).await?;

    config.last_username = Some(username.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    let role = store
        .session()
        .identity()
        .map(|i| i.role.to_string())
        .unwrap_or_else(|| "unknown role".to_string());
    println!("Logged in as {} ({}).", username, role);
    Ok(())
}

async fn whoami(store: &SessionStore) -> Result<()> {
    store.refresh_identity().await?;
    match store.session().identity() {
        Some(identity) => {
            println!("{} ({})", identity.username, identity.role);
            if let Some(email) = identity.email {
                println!("{}", email);
            }
        }
        None => println!("Logged in, identity unavailable"),
    }
    Ok(())
}

async fn register(store: &SessionStore, args: &[String]) -> Result<()> {
    let (username, email) = match (args.first(), args.get(1)) {
        (Some(u), Some(e)) => (u.clone(), e.clone()),
        _ => return Err(anyhow::anyhow!("register needs a username and an email\n\n{}", USAGE)),
    };
    let role = match args.get(2) {
        Some(raw) => Some(raw.parse::<Role>().map_err(|e| anyhow::anyhow!(e))?),
        None => None,
    };

    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        return Err(anyhow::anyhow!("Passwords do not match"));
    }

    let request = RegisterRequest {
        username,
        password,
        email,
        role,
    };
    store.register(&request).await?;
    println!("Registered {}. You can now log in.", request.username);
    Ok(())
}

async fn get(client: &ApiClient, path: &str) -> Result<()> {
    let value: serde_json::Value = client.get(path).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
