//! konnect - conference companion, line-mode driver.
//!
//! Exercises the full client core lifecycle from a terminal: sign in with
//! an access code, populate the cache, inspect it, and log out with a
//! guaranteed purge.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use konnect_core::{
    App, ApiClient, ConferenceBackend, Config, CredentialStore, FileStore, KeyValueStore,
};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn usage() -> ! {
    eprintln!(
        "usage: konnect <command>\n\n\
         commands:\n\
         \x20 login [ACCESS_CODE]   sign in and populate the cache\n\
         \x20 sync                  run a full sync now\n\
         \x20 status                show session and cache health\n\
         \x20 agenda                print the cached agenda\n\
         \x20 logout                purge local data and sign out"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let command = match args.get(1) {
        Some(command) => command.as_str(),
        None => usage(),
    };

    let config = Config::load().context("failed to load config")?;
    let app = build_app(&config)?;

    info!(command, "konnect starting");

    match command {
        "login" => login(&app, &config, args.get(2).map(String::as_str)).await,
        "sync" => sync(&app).await,
        "status" => status(&app).await,
        "agenda" => agenda(&app).await,
        "logout" => logout(&app).await,
        _ => usage(),
    }
}

fn build_app(config: &Config) -> Result<App> {
    let backend_url = config
        .backend_url
        .clone()
        .or_else(|| std::env::var("KONNECT_BACKEND_URL").ok())
        .context("no backend URL configured (config.json or KONNECT_BACKEND_URL)")?;
    let anon_key = config
        .anon_key
        .clone()
        .or_else(|| std::env::var("KONNECT_ANON_KEY").ok())
        .context("no API key configured (config.json or KONNECT_ANON_KEY)")?;

    let store = FileStore::new(config.store_dir()?)?;
    let backend = ApiClient::new(backend_url, anon_key)?;
    let credentials = config
        .conference_slug
        .clone()
        .map(CredentialStore::new);

    Ok(App::with_aux_stores(
        Arc::new(store) as Arc<dyn KeyValueStore>,
        Arc::new(backend) as Arc<dyn ConferenceBackend>,
        Vec::new(),
        credentials,
    ))
}

async fn login(app: &App, config: &Config, code_arg: Option<&str>) -> Result<()> {
    if app.restore_session().await {
        println!("Already signed in as {}", display_name(app));
        return Ok(());
    }

    let access_code = match code_arg {
        Some(code) => code.to_string(),
        None => saved_or_prompted_code(config)?,
    };

    println!("Signing in...");
    let result = app
        .login(&access_code)
        .await
        .context("sign-in failed")?;

    if let Some(slug) = &config.conference_slug {
        if let Err(e) = CredentialStore::new(slug).store(&access_code) {
            tracing::warn!(error = %e, "could not remember access code");
        }
    }

    println!(
        "Signed in as {}. Synced {} collections{}.",
        display_name(app),
        result.synced_keys.len(),
        if result.errors.is_empty() {
            String::new()
        } else {
            format!(" ({} failed)", result.errors.len())
        }
    );
    Ok(())
}

fn saved_or_prompted_code(config: &Config) -> Result<String> {
    if let Some(slug) = &config.conference_slug {
        let credentials = CredentialStore::new(slug);
        if credentials.has_credentials() {
            if let Ok(code) = credentials.get() {
                return Ok(code);
            }
        }
    }

    print!("Access code: ");
    io::stdout().flush()?;
    let mut code = String::new();
    io::stdin().read_line(&mut code)?;
    let code = code.trim().to_string();
    if code.is_empty() {
        bail!("an access code is required");
    }
    Ok(code)
}

async fn sync(app: &App) -> Result<()> {
    if !app.restore_session().await {
        bail!("not signed in; run `konnect login` first");
    }

    let result = app.sync_all().await;
    for error in &result.errors {
        eprintln!("warning: {error}");
    }
    println!(
        "Synced {} collections at {}",
        result.synced_keys.len(),
        result.timestamp.format("%H:%M:%S")
    );
    Ok(())
}

async fn status(app: &App) -> Result<()> {
    let signed_in = app.restore_session().await;
    let state = app.auth_state();

    if signed_in {
        println!("Signed in as {}", display_name(app));
        if let Some(at) = state.signed_in_at {
            println!("  since {}", at.format("%Y-%m-%d %H:%M UTC"));
        }
    } else {
        println!("Not signed in");
    }

    let health = app.health();
    println!(
        "Cache: {:.0}% hit rate, {} errors",
        health.hit_rate * 100.0,
        health.error_count
    );
    Ok(())
}

async fn agenda(app: &App) -> Result<()> {
    if !app.restore_session().await {
        bail!("not signed in; run `konnect login` first");
    }

    let sessions = app.data().agenda().await?;
    if sessions.is_empty() {
        println!("No agenda sessions cached yet.");
        return Ok(());
    }

    for session in sessions {
        println!(
            "{}  {}  [{}]",
            session.starts_at.format("%a %H:%M"),
            session.title,
            session.room.as_deref().unwrap_or("TBA"),
        );
    }
    Ok(())
}

async fn logout(app: &App) -> Result<()> {
    // Restore first so the provider sign-out has a token to revoke; the
    // purge runs either way.
    let _ = app.restore_session().await;

    let report = app.logout().await;
    for error in &report.errors {
        eprintln!("warning: {error}");
    }

    if report.success {
        println!("Signed out. Cleared {} keys.", report.cleared_keys.len());
        Ok(())
    } else {
        bail!("logout could not purge local data; delete the cache directory manually");
    }
}

fn display_name(app: &App) -> String {
    app.auth_state()
        .display_name
        .unwrap_or_else(|| "unknown attendee".to_string())
}
