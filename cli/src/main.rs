use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rolegate::dashboard::{self, DashboardSpec, Route, View};
use rolegate::provider::supabase::SupabaseClient;
use rolegate::seed::{self, SeedReport};
use rolegate::{
    AuthError, AuthProvider, ConfigError, HttpTimeouts, Notice, Notification, NotificationQueue, NotifyConfig,
    ProviderConfig, ProviderError, Role, SessionConfig, SessionStore,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("seeding failed for {failed} of {total} accounts")]
    SeedFailed { failed: usize, total: usize },
    #[error("dashboard unavailable after sign-in: {0:?}")]
    UnexpectedView(View),
}

#[derive(Parser, Debug)]
#[command(name = "rolegate", about = "Role-based session tooling for a Supabase project")]
struct Cli {
    /// Project URL. Falls back to `VITE_SUPABASE_URL` / `NEXT_PUBLIC_SUPABASE_URL`.
    #[arg(long, global = true, env = "SUPABASE_URL")]
    url: Option<String>,

    #[arg(long, global = true, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    anon_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the demo accounts and grant their roles.
    Seed {
        #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
        service_role_key: Option<String>,
    },
    /// Sign in, print the identity and its dashboard, then sign out.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Print the effective role for a user id.
    Role { user_id: Uuid },
    /// Show notifications expiring on their timers.
    NotifyDemo,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Seed { service_role_key } => {
            let mut provider = provider_config(cli.url, cli.anon_key)?;
            if let Some(key) = service_role_key.filter(|k| !k.trim().is_empty()) {
                provider.service_role_key = Some(key.trim().to_owned());
            }
            run_seed(&provider).await
        }
        Command::Login { email, password } => {
            let provider = provider_config(cli.url, cli.anon_key)?;
            run_login(&provider, SessionConfig::from_env()?, &email, &password).await
        }
        Command::Role { user_id } => {
            let provider = provider_config(cli.url, cli.anon_key)?;
            run_role(&provider, SessionConfig::from_env()?, user_id).await
        }
        Command::NotifyDemo => run_notify_demo(NotifyConfig::from_env()?).await,
    }
}

fn provider_config(url: Option<String>, anon_key: Option<String>) -> Result<ProviderConfig, CliError> {
    let config = apply_overrides(ProviderConfig::from_env(), url, anon_key, HttpTimeouts::from_env()?)?;
    Ok(config)
}

/// Command-line values win over the environment. Both flags together stand
/// in for an environment that lacks the URL or key.
fn apply_overrides(
    from_env: Result<ProviderConfig, ConfigError>,
    url: Option<String>,
    anon_key: Option<String>,
    timeouts: HttpTimeouts,
) -> Result<ProviderConfig, ConfigError> {
    match (from_env, url, anon_key) {
        (Ok(mut config), url, anon_key) => {
            if let Some(url) = url {
                config.url = url.trim_end_matches('/').to_owned();
            }
            if let Some(anon_key) = anon_key {
                config.anon_key = anon_key;
            }
            Ok(config)
        }
        (Err(ConfigError::Missing(_)), Some(url), Some(anon_key)) => {
            let mut config = ProviderConfig::new(url, anon_key);
            config.timeouts = timeouts;
            Ok(config)
        }
        (Err(e), _, _) => Err(e),
    }
}

async fn run_seed(provider: &ProviderConfig) -> Result<(), CliError> {
    provider.require_service_role()?;
    let client = SupabaseClient::new(provider)?;
    let accounts = seed::default_accounts();
    info!(count = accounts.len(), url = client.url(), "seeding accounts");

    let report = seed::seed_accounts(&client, &accounts).await;
    print_report(&report);

    let failed = report.failures();
    if failed > 0 {
        return Err(CliError::SeedFailed { failed, total: report.results.len() });
    }
    Ok(())
}

fn print_report(report: &SeedReport) {
    for result in &report.results {
        println!("{result}");
    }
}

async fn run_login(
    provider: &ProviderConfig,
    session: SessionConfig,
    email: &str,
    password: &str,
) -> Result<(), CliError> {
    let client = Arc::new(SupabaseClient::new(provider)?);
    let mut store = SessionStore::start(client, session);
    store.ready().await;

    let identity = store.sign_in(email, password).await?;
    println!("signed in as {} ({})", identity.email, identity.id);
    println!("role: {}", identity.role);

    let view = dashboard::resolve(Route::Dashboard, &store.state());
    let outcome = match view {
        View::Dashboard(spec) => {
            print!("{}", render_dashboard(&spec));
            Ok(())
        }
        other => Err(CliError::UnexpectedView(other)),
    };

    store.sign_out().await?;
    store.shutdown();
    outcome
}

fn render_dashboard(spec: &DashboardSpec) -> String {
    let mut out = format!("\n{}\n{}\n", spec.title, spec.greeting);
    for section in spec.sections {
        out.push_str(&format!("  * {}: {}\n", section.title, section.description));
    }
    out.push_str(&format!("{}:\n", spec.privileges_heading));
    for privilege in spec.privileges {
        out.push_str(&format!("  - {privilege}\n"));
    }
    out
}

async fn run_role(provider: &ProviderConfig, session: SessionConfig, user_id: Uuid) -> Result<(), CliError> {
    let client = SupabaseClient::new(provider)?;
    let lookup = client.query_role_by_user_id(user_id).await;
    let (role, source) = effective_role(lookup, session.fallback_role);
    println!("{user_id}: {role} ({source})");
    Ok(())
}

/// Apply the fallback role the same way the session store does.
fn effective_role(lookup: Result<Option<Role>, ProviderError>, fallback: Role) -> (Role, &'static str) {
    match lookup {
        Ok(Some(role)) => (role, "role record"),
        Ok(None) => (fallback, "no role record, fallback"),
        Err(e) => {
            warn!(error = %e, "role lookup failed");
            (fallback, "lookup failed, fallback")
        }
    }
}

async fn run_notify_demo(config: NotifyConfig) -> Result<(), CliError> {
    let queue = NotificationQueue::new(config);
    let mut rx = queue.subscribe();

    for notice in demo_notices() {
        queue.notify(notice);
    }

    loop {
        let snapshot = rx.borrow_and_update().clone();
        println!("{}", render_queue(&snapshot));
        if snapshot.is_empty() || rx.changed().await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Every demo notice carries its own duration so the demo ends even when the
/// configured default is sticky.
fn demo_notices() -> Vec<Notice> {
    vec![
        Notice::success("Profile saved").duration(Duration::from_millis(1000)),
        Notice::error("Could not reach server").icon("wifi-off").duration(Duration::from_millis(2000)),
        Notice::warning("Session expires soon").duration(Duration::from_millis(3000)),
        Notice::info("New version available").duration(Duration::from_millis(4000)),
    ]
}

fn render_queue(entries: &[Notification]) -> String {
    if entries.is_empty() {
        return "(no notifications)".to_owned();
    }
    entries
        .iter()
        .enumerate()
        .map(|(index, n)| {
            let icon = n.icon.as_deref().map(|i| format!(" <{i}>")).unwrap_or_default();
            format!(
                "+{:>3}px [{}]{icon} {} ({}ms)",
                Notification::offset_px(index),
                n.severity,
                n.message,
                n.duration_ms
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
