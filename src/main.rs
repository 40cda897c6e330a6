use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use regbook::auth::{
    AuthContext, DEFAULT_ADMIN_PASSWORD, DEFAULT_MASTER_PASSWORD, NewUser, PasswordHasher,
    UserManager, UserUpdate,
};
use regbook::backup::{BackupCoordinator, RestoreSelection};
use regbook::config::AppConfig;
use regbook::store::{SqliteStore, Store};
use regbook::types::{Action, RegisterTable, Role};

#[derive(Parser)]
#[command(name = "regbook")]
#[command(about = "Local outsourcing register administration", long_about = None)]
struct Cli {
    /// Data directory for the store, config, and session files
    #[arg(long, global = true, default_value = "./data")]
    data_dir: String,

    /// Username to authenticate as (required for gated commands while
    /// authentication is enabled)
    #[arg(long, global = true)]
    login: Option<String>,

    /// Password for --login; prompted interactively when omitted
    #[arg(long, global = true)]
    login_password: Option<String>,

    /// Authenticate with the master recovery password instead of an account
    #[arg(long, global = true)]
    master: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and store
    Init,

    /// Show store and authentication status
    Status,

    /// Authentication administration
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Account administration
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Backup and restore
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Turn authentication on (bootstraps a default admin on first use)
    Enable,

    /// Turn authentication off; accounts are preserved
    Disable,

    /// Rotate the master recovery password
    MasterPassword {
        /// Current master password; prompted when omitted
        #[arg(long)]
        current: Option<String>,

        /// New master password; prompted when omitted
        #[arg(long)]
        new: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account
    Add {
        username: String,

        /// Display name; defaults to the username
        #[arg(long)]
        display_name: Option<String>,

        /// Role: admin, editor, or viewer
        #[arg(long, default_value = "viewer")]
        role: String,

        /// Password for the new account; prompted when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// List accounts
    List,

    /// Delete an account
    Remove {
        username: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Update an account's display name, role, or password
    Update {
        username: String,

        #[arg(long)]
        display_name: Option<String>,

        /// New role: admin, editor, or viewer
        #[arg(long)]
        role: Option<String>,

        /// New password; omit to keep the current one
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Write a backup archive (raw snapshot + tabular exports)
    Create {
        /// Destination path for the .tar.gz archive
        destination: String,
    },

    /// Restore selected categories from a backup archive. Destructive:
    /// selected categories are replaced with the archive's contents.
    Restore {
        /// Path to the backup archive
        archive: String,

        /// Restore all four categories (full store replace, including
        /// accounts and auth settings)
        #[arg(long)]
        all: bool,

        #[arg(long)]
        suppliers: bool,

        #[arg(long)]
        events: bool,

        #[arg(long)]
        issues: bool,

        #[arg(long)]
        critical_monitor: bool,

        /// Restore from the hand-editable tabular exports instead of the
        /// raw snapshot
        #[arg(long)]
        from_exports: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn parse_role(s: &str) -> anyhow::Result<Role> {
    Role::parse(s).ok_or_else(|| anyhow::anyhow!("invalid role '{s}': expected admin, editor, or viewer"))
}

fn prompt_password(message: &str) -> anyhow::Result<String> {
    Ok(inquire::Password::new(message)
        .without_confirmation()
        .prompt()?)
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<SqliteStore>> {
    if !config.db_path().exists() {
        bail!("Store not initialized. Run 'regbook init' first.");
    }
    Ok(Arc::new(SqliteStore::new(config.db_path())?))
}

/// Establishes a session for gated commands. A no-op while authentication
/// is disabled (open-access mode).
fn authenticate(auth: &mut AuthContext, cli: &Cli) -> anyhow::Result<()> {
    if !auth.auth_settings().auth_enabled {
        return Ok(());
    }

    if cli.master {
        let password = match &cli.login_password {
            Some(p) => p.clone(),
            None => prompt_password("Master password:")?,
        };
        auth.login_with_master(&password)?;
        return Ok(());
    }

    let Some(username) = &cli.login else {
        bail!(
            "Authentication is enabled. Pass --login <username> (with --login-password \
             or an interactive prompt), or --master for recovery access."
        );
    };
    let password = match &cli.login_password {
        Some(p) => p.clone(),
        None => prompt_password(&format!("Password for {username}:"))?,
    };
    auth.login(username, &password, false)?;
    Ok(())
}

fn require(auth: &AuthContext, action: Action) -> anyhow::Result<()> {
    if !auth.has_permission(action) {
        bail!("Permission denied.");
    }
    Ok(())
}

fn run_init(config: &AppConfig) -> anyhow::Result<()> {
    fs::create_dir_all(&config.data_dir)?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let hasher = PasswordHasher::new();
    let settings = store.ensure_auth_settings(&hasher.hash(DEFAULT_MASTER_PASSWORD)?)?;

    println!();
    println!("========================================");
    println!("Store initialized at {}", config.db_path().display());
    println!();
    println!("Authentication is disabled. Enable it with 'regbook auth enable'.");
    if !settings.master_password_changed {
        println!();
        println!("The master recovery password is the factory default ('{DEFAULT_MASTER_PASSWORD}').");
        println!("Rotate it with 'regbook auth master-password'.");
    }
    println!("========================================");
    println!();

    Ok(())
}

fn run_status(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let auth = AuthContext::init(store.clone(), &config.data_dir);
    let settings = auth.auth_settings();

    println!("Data directory:  {}", config.data_dir.display());
    println!(
        "Authentication:  {}",
        if settings.auth_enabled { "enabled" } else { "disabled" }
    );
    println!("Accounts:        {}", store.count_users()?);
    for table in RegisterTable::ALL {
        println!("{:<16} {}", format!("{table}:"), store.count_records(table)?);
    }
    if settings.auth_enabled && !settings.master_password_changed {
        println!();
        println!("Warning: the master recovery password is still the factory default.");
    }

    Ok(())
}

fn run_auth(cli: &Cli, config: &AppConfig, command: &AuthCommands) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let mut auth = AuthContext::init(store, &config.data_dir);
    authenticate(&mut auth, cli)?;
    require(&auth, Action::ManageAuth)?;

    match command {
        AuthCommands::Enable => {
            let outcome = auth.enable_auth()?;
            println!("Authentication enabled.");
            if let Some(admin) = outcome.bootstrapped_admin {
                println!();
                println!("========================================");
                println!("A default administrator account was created:");
                println!();
                println!("  username: {}", admin.username);
                println!("  password: {DEFAULT_ADMIN_PASSWORD}");
                println!();
                println!("Change this password immediately:");
                println!("  regbook user update {} --password <new>", admin.username);
                println!("========================================");
            }
        }
        AuthCommands::Disable => {
            auth.disable_auth()?;
            println!("Authentication disabled. Accounts are preserved.");
        }
        AuthCommands::MasterPassword { current, new } => {
            let current = match current {
                Some(c) => c.clone(),
                None => prompt_password("Current master password:")?,
            };
            let new = match new {
                Some(n) => n.clone(),
                None => prompt_password("New master password:")?,
            };
            if auth.change_master_password(&current, &new)? {
                println!("Master password rotated.");
            } else {
                bail!("Current master password is incorrect.");
            }
        }
    }

    Ok(())
}

fn run_user(cli: &Cli, config: &AppConfig, command: &UserCommands) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let mut auth = AuthContext::init(store.clone(), &config.data_dir);
    authenticate(&mut auth, cli)?;
    require(&auth, Action::ManageUsers)?;

    let manager = UserManager::new(store, config.deletion_policy);

    match command {
        UserCommands::Add {
            username,
            display_name,
            role,
            password,
        } => {
            let password = match password {
                Some(p) => p.clone(),
                None => prompt_password(&format!("Password for {username}:"))?,
            };
            let user = manager.create_user(NewUser {
                username: username.clone(),
                password,
                display_name: display_name.clone().unwrap_or_else(|| username.clone()),
                role: parse_role(role)?,
            })?;
            println!("Created {} ({})", user.username, user.role);
        }
        UserCommands::List => {
            for user in manager.list_users()? {
                println!(
                    "{:<20} {:<8} {}{}",
                    user.username,
                    user.role.to_string(),
                    user.display_name,
                    if user.is_system_user { "  [system]" } else { "" },
                );
            }
        }
        UserCommands::Remove { username, yes } => {
            let user = manager
                .get_user_by_username(username)?
                .ok_or_else(|| anyhow::anyhow!("no such user: {username}"))?;
            let current_id = auth.current_user().map(|u| u.id.clone());

            let check = manager.can_delete_user(&user.id, current_id.as_deref())?;
            if !check.can_delete {
                bail!(
                    "Cannot delete {username}: {}",
                    check.reason.unwrap_or_default()
                );
            }

            if !yes {
                let confirmed = inquire::Confirm::new(&format!(
                    "Delete account '{username}'? This cannot be undone."
                ))
                .with_default(false)
                .prompt()?;
                if !confirmed {
                    return Ok(());
                }
            }

            manager.delete_user(&user.id, current_id.as_deref())?;
            println!("Deleted {username}.");
        }
        UserCommands::Update {
            username,
            display_name,
            role,
            password,
        } => {
            let user = manager
                .get_user_by_username(username)?
                .ok_or_else(|| anyhow::anyhow!("no such user: {username}"))?;

            let role = role.as_deref().map(parse_role).transpose()?;
            manager.update_user(
                &user.id,
                UserUpdate {
                    display_name: display_name.clone(),
                    password: password.clone(),
                    role,
                },
            )?;
            println!("Updated {username}.");
        }
    }

    Ok(())
}

fn run_backup(cli: &Cli, config: &AppConfig, command: &BackupCommands) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let mut auth = AuthContext::init(store.clone(), &config.data_dir);
    authenticate(&mut auth, cli)?;
    // Archives contain credentials, so backup and restore are admin-only.
    require(&auth, Action::ManageAuth)?;

    let coordinator = BackupCoordinator::new(store);

    match command {
        BackupCommands::Create { destination } => {
            let report = coordinator.create_backup(&PathBuf::from(destination))?;
            println!("Backup written to {}", report.path.display());
            for (table, rows) in &report.manifest.row_counts {
                println!("  {table}: {rows} rows");
            }
            println!("  snapshot sha256: {}", report.manifest.snapshot_sha256);
        }
        BackupCommands::Restore {
            archive,
            all,
            suppliers,
            events,
            issues,
            critical_monitor,
            from_exports,
            yes,
        } => {
            let selection = if *all {
                RestoreSelection::all()
            } else {
                RestoreSelection {
                    suppliers: *suppliers,
                    events: *events,
                    issues: *issues,
                    critical_monitor: *critical_monitor,
                }
            };
            if selection.is_empty() {
                bail!("Select categories to restore (--all or one or more of --suppliers, --events, --issues, --critical-monitor).");
            }

            if !yes {
                let scope = if selection.is_all() && !from_exports {
                    "the ENTIRE store, including accounts and auth settings".to_string()
                } else {
                    format!(
                        "these categories: {}",
                        selection
                            .tables()
                            .iter()
                            .map(|t| t.table_name())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                };
                let confirmed = inquire::Confirm::new(&format!(
                    "Restoring will irreversibly replace {scope}. Continue?"
                ))
                .with_default(false)
                .prompt()?;
                if !confirmed {
                    return Ok(());
                }
            }

            let archive = PathBuf::from(archive);
            let stats = if *from_exports {
                coordinator.restore_from_exports(&archive, &selection)?
            } else {
                coordinator.restore_from_snapshot(&archive, &selection)?
            };

            println!("Restore complete ({} rows).", stats.total());
            println!("  suppliers: {}", stats.suppliers);
            println!("  events: {}", stats.events);
            println!("  issues: {}", stats.issues);
            println!("  critical_monitor: {}", stats.critical_monitor);
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("regbook=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.data_dir)?;

    match &cli.command {
        Commands::Init => run_init(&config)?,
        Commands::Status => run_status(&config)?,
        Commands::Auth { command } => run_auth(&cli, &config, command)?,
        Commands::User { command } => run_user(&cli, &config, command)?,
        Commands::Backup { command } => run_backup(&cli, &config, command)?,
    }

    Ok(())
}
