//! CLI commands

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand, ValueEnum};
use safawinet_client::realtime::PollDecision;
use safawinet_client::{
    ActivityEvent, AutoLogout, ClientBuilder, DashboardFeed, DashboardState, FileStorage,
    IdleState, NotificationCenter, NotificationEvent, NotificationFilter, SafawiClient,
    SessionStore, WebSocketTransport,
};
use safawinet_core::access::Action;
use safawinet_core::audit::DEFAULT_PAGE_SIZE;
use safawinet_core::types::{
    LoginOutcome, Notification, ProfileUpdate, Severity, UserPreferences, UserProfile,
};
use safawinet_core::{AuditLogQuery, PermissionSet, export_csv, visible_navigation};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::config::{CONFIG_FILE, CliConfig, SESSION_FILE};

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        /// Username, email address or phone number
        identifier: String,

        /// Password (prompted for when omitted)
        #[arg(long, env = "SAFAWINET_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Two-factor code (prompted for when the account requires one)
        #[arg(long)]
        code: Option<String>,

        /// Ask the server for a long-lived session
        #[arg(long)]
        remember_me: bool,
    },

    /// Sign out and remove the stored session
    Logout,

    /// Show the signed-in user and the pages they can open
    Whoami {
        /// Reload the profile from the server first
        #[arg(long)]
        refresh: bool,
    },

    /// Request a password reset link
    ForgotPassword {
        /// Username, email address or phone number
        identifier: String,
    },

    /// Profile and preference management
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Browse and export audit logs
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Notification bell
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },

    /// Security dashboard
    Dashboard {
        /// Stay open and follow live updates
        #[arg(long)]
        watch: bool,

        /// Show system health instead of the security overview
        #[arg(long, conflicts_with = "watch")]
        health: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Update identity fields
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },

    /// Update display and session preferences
    Preferences {
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        timezone: Option<String>,
        #[arg(long)]
        language: Option<String>,
        /// Idle minutes before automatic logout
        #[arg(long)]
        auto_logout: Option<u32>,
    },

    /// Change the account password (prompts for each value)
    Password,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SeverityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<SeverityArg> for Severity {
    fn from(value: SeverityArg) -> Self {
        match value {
            SeverityArg::Low => Severity::Low,
            SeverityArg::Medium => Severity::Medium,
            SeverityArg::High => Severity::High,
            SeverityArg::Critical => Severity::Critical,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct AuditFilter {
    #[arg(long)]
    action: Option<String>,

    /// User id
    #[arg(long)]
    user: Option<String>,

    #[arg(long, value_enum)]
    severity: Option<SeverityArg>,

    /// `success` or `failure`
    #[arg(long)]
    status: Option<String>,

    #[arg(long)]
    search: Option<String>,

    /// Earliest record, RFC 3339
    #[arg(long)]
    since: Option<DateTime<Utc>>,

    /// Latest record, RFC 3339
    #[arg(long)]
    until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn to_query(&self) -> AuditLogQuery {
        let mut query = AuditLogQuery::new();
        if let Some(action) = &self.action {
            query = query.action(action);
        }
        if let Some(user) = &self.user {
            query = query.user(user);
        }
        if let Some(severity) = self.severity {
            query = query.severity(severity.into());
        }
        if let Some(status) = &self.status {
            query = query.status(status);
        }
        if let Some(search) = &self.search {
            query = query.search(search);
        }
        query.start_date = self.since;
        query.end_date = self.until;
        query
    }
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show one page of audit records
    List {
        #[command(flatten)]
        filter: AuditFilter,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
    },

    /// Export matching records as CSV
    Export {
        #[command(flatten)]
        filter: AuditFilter,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after this many records
        #[arg(long, default_value_t = 10_000)]
        max: usize,
    },
}

#[derive(Subcommand)]
pub enum NotificationCommands {
    /// List notifications
    List {
        #[arg(long)]
        unread: bool,

        #[arg(long, conflicts_with = "unread")]
        archived: bool,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Mark one notification as read
    Read { id: String },

    /// Mark every notification as read
    ReadAll,

    /// Hide a notification from the bell
    Dismiss { id: String },

    /// Move a notification to the archive
    Archive { id: String },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with default values
    Init {
        /// Output file path (defaults to <data-dir>/config.toml)
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

/// Everything a command needs to reach the API
pub struct Context {
    pub data_dir: PathBuf,
    pub config: CliConfig,
    pub request_timeout: Option<Duration>,
}

impl Context {
    fn session(&self) -> Result<SessionStore> {
        let storage = FileStorage::new(self.data_dir.join(SESSION_FILE));
        let session = SessionStore::new(Arc::new(storage));
        session.restore().context("Failed to read stored session")?;
        Ok(session)
    }

    fn client(&self, session: SessionStore) -> Result<SafawiClient> {
        let mut builder = ClientBuilder::new().base_url(&self.config.api_url);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build(session)?)
    }

    fn signed_in(&self) -> Result<SafawiClient> {
        let session = self.session()?;
        if !session.is_authenticated() {
            bail!("Not signed in. Run `safawinet login` first.");
        }
        self.client(session)
    }
}

impl Commands {
    pub async fn execute(self, ctx: Context) -> Result<()> {
        match self {
            Commands::Login {
                identifier,
                password,
                code,
                remember_me,
            } => login(&ctx, &identifier, password, code, remember_me).await,
            Commands::Logout => logout(&ctx).await,
            Commands::Whoami { refresh } => whoami(&ctx, refresh).await,
            Commands::ForgotPassword { identifier } => {
                let client = ctx.client(SessionStore::in_memory())?;
                let message = client.to_public().forgot_password(&identifier).await?;
                println!(
                    "{}",
                    message.unwrap_or_else(|| "If the account exists, a reset link was sent".into())
                );
                Ok(())
            }
            Commands::Profile { command } => command.execute(&ctx).await,
            Commands::Audit { command } => command.execute(&ctx).await,
            Commands::Notifications { command } => command.execute(&ctx).await,
            Commands::Dashboard { watch, health } => {
                if watch {
                    watch_dashboard(&ctx).await
                } else {
                    show_dashboard(&ctx, health).await
                }
            }
            Commands::Config { command } => command.execute(&ctx),
        }
    }
}

async fn prompt(label: &str) -> Result<String> {
    eprint!("{label}");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn login(
    ctx: &Context,
    identifier: &str,
    password: Option<String>,
    code: Option<String>,
    remember_me: bool,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt("Password: ").await?,
    };
    let client = ctx.client(ctx.session()?)?;

    let user = match client.login(identifier, &password, remember_me).await? {
        LoginOutcome::Authenticated(success) => success.user,
        LoginOutcome::TwoFactorRequired { user_id, .. } => {
            let code = match code {
                Some(code) => code,
                None => prompt("Two-factor code: ").await?,
            };
            match client.verify_two_factor(&user_id, &code).await? {
                LoginOutcome::Authenticated(success) => success.user,
                LoginOutcome::TwoFactorRequired { .. } => {
                    bail!("Two-factor verification was not accepted")
                }
            }
        }
    };
    println!("Signed in as {}", user.display_name());
    Ok(())
}

async fn logout(ctx: &Context) -> Result<()> {
    let session = ctx.session()?;
    if !session.is_authenticated() {
        println!("Not signed in");
        return Ok(());
    }
    ctx.client(session)?.logout().await?;
    println!("Signed out");
    Ok(())
}

async fn whoami(ctx: &Context, refresh: bool) -> Result<()> {
    let client = ctx.signed_in()?;
    let user = if refresh {
        client.me().await?
    } else {
        client.session().user().context("Not signed in")?
    };
    print_user(&user);
    Ok(())
}

fn print_user(user: &UserProfile) {
    println!("{} ({})", user.display_name(), user.id);
    if let Some(email) = &user.email {
        let verified = if user.email_verified { "" } else { " (unverified)" };
        println!("Email: {email}{verified}");
    }
    if let Some(phone) = &user.phone {
        let verified = if user.phone_verified { "" } else { " (unverified)" };
        println!("Phone: {phone}{verified}");
    }
    if PermissionSet::from_user(user).is_super_admin() {
        println!("Role: super admin");
    }
    println!(
        "Two-factor: {}",
        if user.two_factor_enabled { "on" } else { "off" }
    );
    if let Some(minutes) = user.preferences.auto_logout_minutes {
        println!("Auto logout: {minutes} min");
    }
    let pages: Vec<&str> = visible_navigation(user)
        .into_iter()
        .map(|item| item.label)
        .collect();
    println!("Pages: {}", pages.join(", "));
}

impl ProfileCommands {
    async fn execute(self, ctx: &Context) -> Result<()> {
        let client = ctx.signed_in()?;
        match self {
            ProfileCommands::Update {
                name,
                username,
                email,
                phone,
            } => {
                let update = ProfileUpdate {
                    name,
                    username,
                    email,
                    phone,
                };
                let user = client.update_profile(&update).await?;
                print_user(&user);
            }
            ProfileCommands::Preferences {
                theme,
                timezone,
                language,
                auto_logout,
            } => {
                let preferences = UserPreferences {
                    theme,
                    timezone,
                    language,
                    auto_logout_minutes: auto_logout,
                };
                let user = client.update_preferences(&preferences).await?;
                print_user(&user);
            }
            ProfileCommands::Password => {
                let current = prompt("Current password: ").await?;
                let new = prompt("New password: ").await?;
                let confirm = prompt("Confirm new password: ").await?;
                let message = client.change_password(&current, &new, &confirm).await?;
                println!("{}", message.unwrap_or_else(|| "Password changed".into()));
            }
        }
        Ok(())
    }
}

impl AuditCommands {
    async fn execute(self, ctx: &Context) -> Result<()> {
        let client = ctx.signed_in()?;
        match self {
            AuditCommands::List {
                filter,
                page,
                limit,
            } => {
                let query = filter.to_query().page(page).limit(limit);
                let result = client.audit_logs(&query).await?;
                for entry in &result.logs {
                    println!("{}", entry.summary());
                }
                let pagination = result.pagination;
                println!(
                    "Page {} of {} ({} records)",
                    pagination.page, pagination.total_pages, pagination.total
                );
            }
            AuditCommands::Export {
                filter,
                output,
                max,
            } => {
                let user = client.session().user().context("Not signed in")?;
                if !PermissionSet::from_user(&user).can_do("audit-logs", Action::Export) {
                    bail!("Your account may not export audit logs");
                }
                let entries = client.audit_logs_all(&filter.to_query(), max).await?;
                let csv = export_csv(&entries);
                match output {
                    Some(path) => {
                        std::fs::write(&path, csv)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        eprintln!("Exported {} records to {}", entries.len(), path.display());
                    }
                    None => print!("{csv}"),
                }
            }
        }
        Ok(())
    }
}

fn print_notification(notification: &Notification) {
    let marker = if notification.is_read { ' ' } else { '*' };
    println!(
        "{marker} {} [{}] {} - {} ({})",
        notification.id,
        notification.kind,
        notification.title,
        notification.message,
        notification.created_at.format("%Y-%m-%d %H:%M")
    );
}

impl NotificationCommands {
    async fn execute(self, ctx: &Context) -> Result<()> {
        let client = ctx.signed_in()?;
        match self {
            NotificationCommands::List {
                unread,
                archived,
                page,
                limit,
            } => {
                let filter = if unread {
                    NotificationFilter::Unread
                } else if archived {
                    NotificationFilter::Archived
                } else {
                    NotificationFilter::All
                };
                let list = client.notifications(filter, page, limit).await?;
                for notification in list.notifications.iter().filter(|n| !n.is_dismissed) {
                    print_notification(notification);
                }
                println!("{} unread", list.unread_count);
            }
            NotificationCommands::Read { id } => client.mark_notification_read(&id).await?,
            NotificationCommands::ReadAll => client.mark_all_notifications_read().await?,
            NotificationCommands::Dismiss { id } => client.dismiss_notification(&id).await?,
            NotificationCommands::Archive { id } => client.archive_notification(&id).await?,
        }
        Ok(())
    }
}

async fn show_dashboard(ctx: &Context, health: bool) -> Result<()> {
    let client = ctx.signed_in()?;
    let data = if health {
        client.system_health().await?
    } else {
        client.security_dashboard().await?
    };
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn render(state: &DashboardState) {
    let mode = if state.connected { "live" } else { "polling" };
    let updated = state
        .last_updated
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("--- {mode}, updated {updated} ---");
    if let Some(warning) = &state.warning {
        println!("! {warning}");
    }
    for (key, value) in &state.data {
        println!("{key}: {value}");
    }
}

/// Follow the dashboard until quit, Ctrl-C, sign-out or inactivity
async fn watch_dashboard(ctx: &Context) -> Result<()> {
    let client = ctx.signed_in()?;
    let session = client.session().clone();

    let center = NotificationCenter::new(client.clone());
    match center.load(20).await {
        Ok(unread) => println!("{unread} unread notifications"),
        Err(err) => warn!(error = %err, "Could not load notifications"),
    }

    let transport = WebSocketTransport::from_base_url(
        client.base_url(),
        &ctx.config.socket_path,
        session.clone(),
    )?;
    let feed = DashboardFeed::builder(Arc::new(client.clone()))
        .transport(Arc::new(transport))
        .notifications(center.clone())
        .config(ctx.config.realtime())
        .spawn();
    let mut timer = AutoLogout::for_session(&session).context("Not signed in")?;
    debug!(timeout = ?timer.timeout(), "Watching dashboard");

    let mut state = feed.subscribe();
    let mut notifications = center.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    eprintln!("Commands: r = refresh, q = quit");

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                render(&snapshot);
            }
            Some(event) = notifications.recv() => match event {
                NotificationEvent::Received(notification) => {
                    print_notification(&notification);
                }
                NotificationEvent::Updated(_) | NotificationEvent::Synced { .. } => {
                    debug!(unread = center.unread_count(), "Notifications changed");
                }
            },
            line = lines.next_line(), if stdin_open => {
                let input = WatchInput::parse(line?);
                if input != WatchInput::Closed {
                    timer.record(ActivityEvent::Command);
                }
                match input {
                    WatchInput::Closed => {
                        debug!("stdin closed, watching without commands");
                        stdin_open = false;
                    }
                    WatchInput::Quit => break,
                    WatchInput::Refresh => match feed.refresh_now().await {
                        PollDecision::Proceed => {}
                        PollDecision::CoolingDown { remaining } => {
                            println!("Rate limited, try again in {}s", remaining.as_secs());
                        }
                        other => println!("Refresh skipped: {other:?}"),
                    },
                    WatchInput::Empty => {}
                    WatchInput::Unknown(other) => eprintln!("Unknown command: {other}"),
                }
            }
            ended = timer.finished() => {
                match ended {
                    IdleState::Expired => println!("Signed out after inactivity"),
                    _ => println!("Session ended"),
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    feed.shutdown();
    Ok(())
}

/// One line typed while watching the dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchInput {
    Quit,
    Refresh,
    Empty,
    Unknown(String),
    /// End of input; the watch keeps running
    Closed,
}

impl WatchInput {
    fn parse(line: Option<String>) -> Self {
        let Some(line) = line else {
            return Self::Closed;
        };
        match line.trim() {
            "q" | "quit" => Self::Quit,
            "r" | "refresh" => Self::Refresh,
            "" => Self::Empty,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl ConfigCommands {
    fn execute(self, ctx: &Context) -> Result<()> {
        match self {
            ConfigCommands::Init { output, force } => {
                let path = output.unwrap_or_else(|| ctx.data_dir.join(CONFIG_FILE));
                if path.exists() && !force {
                    bail!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    );
                }
                CliConfig::default().save(&path)?;
                println!("Configuration written to {}", path.display());
            }
            ConfigCommands::Show => print!("{}", toml::to_string_pretty(&ctx.config)?),
        }
        Ok(())
    }
}
