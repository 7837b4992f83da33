use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, load_settings_from, ConsentContext, ConsentSettings};
use serde_json::json;
use shared::{
    domain::{Category, ConsentRecord},
    protocol::UserAction,
};
use storage::ConsentStore;
use tag_bridge::ConsentDirectives;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Inspect and drive the consent state kept in a local cookie jar.
#[derive(Parser, Debug)]
struct Cli {
    /// Settings file; defaults to ./consent.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored record, if any.
    Show,
    AcceptAll,
    RefuseAll,
    /// Commit a custom choice. Omitted categories are refused.
    Save {
        #[arg(long)]
        functional: bool,
        #[arg(long)]
        analytics: bool,
        #[arg(long)]
        marketing: bool,
    },
    /// Forget the stored decision so the banner shows again.
    Reset,
    /// Print the data layer a page load would produce.
    Directives,
    /// Print the view model for the current state.
    Render {
        #[arg(long)]
        preferences: bool,
    },
    /// Print the tag manager container URLs.
    Gtm,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings(),
    };
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    match cli.command {
        Command::Show => {
            let context = ConsentContext::open(&settings).await?;
            let record = context.store().read().await;
            print_json(&json!({
                "cookie_name": settings.cookie_name,
                "record": record,
                "directives": record.as_ref().map(ConsentDirectives::from_record),
            }))?;
        }
        Command::AcceptAll => commit(&settings, UserAction::AcceptAll).await?,
        Command::RefuseAll => commit(&settings, UserAction::RefuseAll).await?,
        Command::Save {
            functional,
            analytics,
            marketing,
        } => {
            let context = ConsentContext::open(&settings).await?;
            context.start().await;
            save_choice(&context, ConsentRecord::new(functional, analytics, marketing)).await?;
            print_record(&context).await?;
        }
        Command::Reset => {
            let context = ConsentContext::open(&settings).await?;
            context.store().clear().await?;
            info!(cookie = %settings.cookie_name, "consent: stored decision cleared");
        }
        Command::Directives => {
            let context = ConsentContext::open(&settings).await?;
            context.start().await;
            print_json(&json!(context.data_layer().to_wire()))?;
        }
        Command::Render { preferences } => {
            let context = ConsentContext::open(&settings).await?;
            context.start().await;
            if preferences {
                context.dispatch(UserAction::OpenPreferences).await?;
            }
            print_json(&json!(context.view().await))?;
        }
        Command::Gtm => {
            let context = ConsentContext::open(&settings).await?;
            let Some(container) = context.container() else {
                anyhow::bail!("no valid tag manager container id configured (set GTM_ID)");
            };
            print_json(&json!({
                "id": container.id(),
                "script": container.script_url()?.as_str(),
                "noscript": container.noscript_url()?.as_str(),
            }))?;
        }
    }

    Ok(())
}

async fn commit(settings: &ConsentSettings, action: UserAction) -> Result<()> {
    let context = ConsentContext::open(settings).await?;
    context.start().await;
    context.dispatch(action).await?;
    print_record(&context).await
}

/// Drives the preferences editor the way a visitor would: open it, flip
/// every category that differs from `wanted`, then save.
async fn save_choice(context: &ConsentContext, wanted: ConsentRecord) -> Result<()> {
    context.dispatch(UserAction::OpenPreferences).await?;
    let draft = context
        .controller()
        .draft()
        .await
        .context("preferences editor did not open")?;
    for category in Category::ALL.into_iter().filter(|c| c.is_mutable()) {
        if draft.get(category) != wanted.get(category) {
            context
                .dispatch(UserAction::ToggleCategory { category })
                .await?;
        }
    }
    context.dispatch(UserAction::SavePreferences).await?;
    Ok(())
}

async fn print_record(context: &ConsentContext) -> Result<()> {
    print_json(&json!({
        "record": context.store().read().await,
        "data_layer": context.data_layer().to_wire(),
    }))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
