//! Command-line session client.
//!
//! Drives the same session manager the desktop screens use, against the REST
//! backend configured through `ERPDESK_*` variables.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use erpdesk_auth::Credentials;
use erpdesk_core::OrganizationId;
use erpdesk_session::http::{HttpAuthProvider, HttpRbacProvider};
use erpdesk_session::{KeyValueStore, RedbStore, SessionConfig, SessionManager};

#[derive(Debug, Parser)]
#[command(name = "erpdesk-session", about = "Inspect and manage the ERP client session")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the restored (and refreshed) session as JSON.
    Status,
    /// Log in and print the resulting session.
    Login {
        #[arg(long, env = "ERPDESK_USERNAME")]
        username: String,
        #[arg(long, env = "ERPDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the session locally and remotely.
    Logout,
    /// Switch the active organization.
    SwitchOrg { id: String, name: String },
    /// Evaluate capability predicates for the current session.
    Check {
        #[arg(long)]
        can_view: Vec<String>,
        #[arg(long)]
        can_manage: Vec<String>,
        #[arg(long)]
        role: Vec<String>,
        #[arg(long)]
        permission: Vec<String>,
        /// Print the grant-level explanation for a resource.
        #[arg(long)]
        explain: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    erpdesk_observability::init();
    let cli = Cli::parse();

    let config = SessionConfig::from_env().context("invalid ERPDESK_* configuration")?;
    let path = config.resolve_cache_path()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(
        RedbStore::open(&path).with_context(|| format!("failed to open session store at {:?}", path))?,
    );

    let auth = Arc::new(HttpAuthProvider::new(config.api_url.clone(), store.clone()));
    let rbac = Arc::new(HttpRbacProvider::new(config.api_url.clone(), store.clone()));
    let session = SessionManager::new(auth, rbac, store, &config);

    let report = session.initialize().await;
    tracing::debug!(?report, "session initialized");

    match cli.command {
        Command::Status => print_snapshot(&session)?,
        Command::Login { username, password } => {
            session
                .login(&Credentials::new(username, password))
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            print_snapshot(&session)?;
        }
        Command::Logout => {
            let report = session.logout().await;
            if let Some(err) = report.remote_error {
                eprintln!("remote logout failed ({err}); local session cleared");
            }
        }
        Command::SwitchOrg { id, name } => {
            let id: OrganizationId = id.parse()?;
            session.set_current_organization(id, name)?;
            print_snapshot(&session)?;
        }
        Command::Check {
            can_view,
            can_manage,
            role,
            permission,
            explain,
        } => {
            let mut results = serde_json::Map::new();
            for r in &can_view {
                results.insert(format!("can_view:{r}"), session.can_view(r).into());
            }
            for r in &can_manage {
                results.insert(format!("can_manage:{r}"), session.can_manage(r).into());
            }
            for code in &role {
                results.insert(format!("has_role:{code}"), session.has_role(code).into());
            }
            for code in &permission {
                results.insert(format!("has_permission:{code}"), session.has_permission(code).into());
            }
            if !permission.is_empty() {
                results.insert(
                    "has_any_permission".to_string(),
                    session.has_any_permission(&permission).into(),
                );
            }
            if let Some(resource) = explain {
                results.insert(
                    "explain".to_string(),
                    serde_json::to_value(session.explain(&resource))?,
                );
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    session.teardown();
    Ok(())
}

fn print_snapshot(session: &SessionManager) -> anyhow::Result<()> {
    let snapshot = session.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
