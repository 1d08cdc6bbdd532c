//! Subcommand definitions and handlers.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Args, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{info, warn};

use switchboard_core::bus::{Bus, FileBus, Message, MessageKind};
use switchboard_core::compact::{format_bytes, format_elapsed, CompactionMonitor};
use switchboard_core::config::SwitchboardConfig;
use switchboard_core::cron::{CronScheduler, CronStore, NewCronEntry};
use switchboard_core::infrastructure::runner::ShellRunner;
use switchboard_core::infrastructure::tmux::TmuxTerminal;
use switchboard_core::layout::Layout;
use switchboard_core::notify::{NotificationDispatcher, NotifyOutcome};
use switchboard_core::session::{FileSessionStore, SessionMetaStore};
use switchboard_core::subscribe::{FanOut, NewSubscription, PublishEvent, SubscriptionStore};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Request,
    Response,
    Event,
    Notice,
}

impl From<KindArg> for MessageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Request => MessageKind::Request,
            KindArg::Response => MessageKind::Response,
            KindArg::Event => MessageKind::Event,
            KindArg::Notice => MessageKind::Notice,
        }
    }
}

#[derive(Args)]
pub struct SendArgs {
    #[arg(long)]
    pub from: String,
    #[arg(long)]
    pub to: String,
    #[arg(long)]
    pub action: String,
    #[arg(long, value_enum, default_value = "request")]
    pub kind: KindArg,
    /// JSON payload
    #[arg(long)]
    pub payload: Option<String>,
    /// Id of the message this one answers
    #[arg(long)]
    pub reply_to: Option<String>,
    /// Only enqueue; skip the terminal alert
    #[arg(long)]
    pub no_notify: bool,
}

#[derive(Args)]
pub struct PublishArgs {
    #[arg(long)]
    pub event: String,
    /// success or failure
    #[arg(long)]
    pub outcome: String,
    /// Sender recorded on fanned-out messages
    #[arg(long, default_value = "switchboard")]
    pub publisher: String,
    #[arg(long)]
    pub exit_code: Option<i32>,
    /// The command line that produced the outcome
    #[arg(long = "cmd", default_value = "")]
    pub command: String,
}

#[derive(Subcommand)]
pub enum CronCommand {
    /// Add an entry
    Add {
        /// @hourly, @daily, every 15m, ...
        #[arg(long)]
        schedule: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        action: String,
        #[arg(long, default_value = "")]
        message: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    /// List entries
    List {
        #[arg(long)]
        json: bool,
    },
    Remove { id: String },
    Enable { id: String },
    Disable { id: String },
    /// Fire every due entry once
    Tick,
    /// Recent firings
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum SubCommand {
    /// Add a subscription
    Add {
        /// Event name or *
        #[arg(long)]
        event: String,
        /// success, failure or *
        #[arg(long, default_value = "*")]
        outcome: String,
        /// Role that receives the message
        #[arg(long)]
        notify: String,
        #[arg(long)]
        action: String,
        /// Template; {event}, {outcome}, {exit_code} and {command} are filled in
        #[arg(long, default_value = "{event} finished: {outcome}")]
        message: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    /// List subscriptions
    List {
        #[arg(long)]
        json: bool,
    },
    Remove { id: String },
    Enable { id: String },
    Disable { id: String },
}

#[derive(Subcommand)]
pub enum CompactCommand {
    /// Report roles over the size and age thresholds
    Check { roles: Vec<String> },
    /// Record that a role's memory was just compacted
    Done { role: String },
}

#[derive(Subcommand)]
pub enum HarnessCommand {
    /// Advertise a harness process for a role
    Attach {
        role: String,
        #[arg(long)]
        pid: u32,
    },
    Detach { role: String },
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a handler needs, built once from the configuration.
pub struct Ctx {
    config: SwitchboardConfig,
    layout: Layout,
    session: String,
    bus: FileBus,
    terminal: TmuxTerminal<ShellRunner>,
}

impl Ctx {
    pub fn load(config_path: &Path, session: &str) -> Result<Self> {
        let config = SwitchboardConfig::load(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?;
        let layout = Layout::new(config.state_dir.clone());
        Ok(Ctx {
            bus: FileBus::new(layout.clone()),
            terminal: TmuxTerminal::new(ShellRunner),
            session: session.to_string(),
            config,
            layout,
        })
    }

    fn dispatcher(&self) -> NotificationDispatcher<'_> {
        NotificationDispatcher::new(&self.config, self.layout.clone(), &self.bus, &self.terminal)
    }

    fn check_role(&self, role: &str) -> Result<()> {
        if !self.config.is_known_role(role) {
            bail!(
                "unknown role '{}' (known: {})",
                role,
                self.config.roles.join(", ")
            );
        }
        Ok(())
    }

    /// The given roles, or every configured role when empty.
    fn roles_or_all(&self, roles: Vec<String>) -> Result<Vec<String>> {
        if roles.is_empty() {
            return Ok(self.config.roles.clone());
        }
        for role in &roles {
            self.check_role(role)?;
        }
        Ok(roles)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub fn send(ctx: &Ctx, args: SendArgs) -> Result<()> {
    ctx.check_role(&args.to)?;
    let payload = match &args.payload {
        Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
        None => Value::Null,
    };
    let message = Message::new(
        &args.from,
        &args.to,
        args.kind.into(),
        &args.action,
        payload,
        args.reply_to,
    );
    ctx.bus
        .send(&ctx.session, &message)
        .context("Failed to enqueue message")?;
    println!("{}", message.id);

    if !args.no_notify {
        match ctx.dispatcher().notify(&ctx.session, &args.to) {
            Ok(outcome) => info!(role = %args.to, ?outcome, "notify"),
            Err(e) => warn!(role = %args.to, error = %e, "message queued but alert failed"),
        }
    }
    Ok(())
}

pub fn notify(ctx: &Ctx, roles: Vec<String>) -> Result<()> {
    let roles = ctx.roles_or_all(roles)?;
    let dispatcher = ctx.dispatcher();
    let mut failed = 0;
    for (role, result) in dispatcher.notify_all(&ctx.session, &roles) {
        match result {
            Ok(outcome) => println!("{:<10} {}", role, describe(outcome)),
            Err(e) => {
                failed += 1;
                println!("{:<10} error: {}", role, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} alert(s) failed", failed);
    }
    Ok(())
}

pub fn cron(ctx: &Ctx, command: CronCommand) -> Result<()> {
    let store = CronStore::for_session(&ctx.config, &ctx.layout, &ctx.session);
    match command {
        CronCommand::Add {
            schedule,
            target,
            action,
            message,
            id,
            disabled,
        } => {
            let entry = store.add(
                NewCronEntry {
                    id,
                    schedule,
                    target,
                    action,
                    message,
                    disabled,
                },
                Utc::now(),
            )?;
            println!("{}", entry.id);
        }
        CronCommand::List { json } => {
            let entries = store.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No cron entries.");
            } else {
                for e in entries {
                    let last = if e.last_run == 0 {
                        "never".to_string()
                    } else {
                        Utc.timestamp_opt(e.last_run, 0)
                            .single()
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| e.last_run.to_string())
                    };
                    let next = e
                        .next_due()
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<16} {:<3} {:<14} {:<8} {:<20} runs={} last={} next={}",
                        e.id,
                        if e.enabled { "on" } else { "off" },
                        e.schedule,
                        e.target,
                        e.action,
                        e.run_count,
                        last,
                        next
                    );
                }
            }
        }
        CronCommand::Remove { id } => {
            store.remove(&id)?;
            println!("Removed {}", id);
        }
        CronCommand::Enable { id } => {
            store.set_enabled(&id, true)?;
            println!("Enabled {}", id);
        }
        CronCommand::Disable { id } => {
            store.set_enabled(&id, false)?;
            println!("Disabled {}", id);
        }
        CronCommand::Tick => {
            let dispatcher = ctx.dispatcher();
            let scheduler = CronScheduler::new(&ctx.session, store, &ctx.bus)
                .with_dispatcher(&dispatcher);
            let report = scheduler.tick(Utc::now())?;
            for run in &report.fired {
                println!("fired {} -> {} ({})", run.entry_id, run.target, run.message_id);
            }
            for (id, e) in &report.failed {
                println!("failed {}: {}", id, e);
            }
            if !report.failed.is_empty() {
                bail!("{} cron entr(ies) failed to fire", report.failed.len());
            }
        }
        CronCommand::History { limit, json } => {
            let runs = store.history(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                for run in runs {
                    println!(
                        "{} {:<16} {:<8} {}",
                        run.fired_at.to_rfc3339(),
                        run.entry_id,
                        run.target,
                        run.action
                    );
                }
            }
        }
    }
    Ok(())
}

pub fn sub(ctx: &Ctx, command: SubCommand) -> Result<()> {
    let store = SubscriptionStore::for_session(&ctx.config, &ctx.layout, &ctx.session);
    match command {
        SubCommand::Add {
            event,
            outcome,
            notify,
            action,
            message,
            id,
            disabled,
        } => {
            let sub = store.add(
                NewSubscription {
                    id,
                    event,
                    outcome,
                    notify,
                    action,
                    message,
                    disabled,
                },
                Utc::now(),
            )?;
            println!("{}", sub.id);
        }
        SubCommand::List { json } => {
            let subs = store.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&subs)?);
            } else if subs.is_empty() {
                println!("No subscriptions.");
            } else {
                for s in subs {
                    println!(
                        "{:<14} {:<3} {:<8} {:<8} -> {:<8} {:<20} fired={}",
                        s.id,
                        if s.enabled { "on" } else { "off" },
                        s.event,
                        s.outcome,
                        s.notify,
                        s.action,
                        s.fire_count
                    );
                }
            }
        }
        SubCommand::Remove { id } => {
            store.remove(&id)?;
            println!("Removed {}", id);
        }
        SubCommand::Enable { id } => {
            store.set_enabled(&id, true)?;
            println!("Enabled {}", id);
        }
        SubCommand::Disable { id } => {
            store.set_enabled(&id, false)?;
            println!("Disabled {}", id);
        }
    }
    Ok(())
}

pub fn publish(ctx: &Ctx, args: PublishArgs) -> Result<()> {
    let store = SubscriptionStore::for_session(&ctx.config, &ctx.layout, &ctx.session);
    let dispatcher = ctx.dispatcher();
    let fanout = FanOut::new(store, &ctx.bus).with_dispatcher(&dispatcher);
    let report = fanout.publish(&PublishEvent {
        session: ctx.session.clone(),
        publisher: args.publisher,
        event: args.event,
        outcome: args.outcome,
        exit_code: args.exit_code,
        command: args.command,
    })?;

    for sent in &report.sent {
        println!("{} -> {} ({})", sent.subscription_id, sent.role, sent.message_id);
    }
    for (id, e) in &report.send_failures {
        println!("{} failed: {}", id, e);
    }
    if report.matched() == 0 {
        println!("No matching subscriptions.");
    }
    if !report.send_failures.is_empty() {
        bail!("{} subscription message(s) not sent", report.send_failures.len());
    }
    Ok(())
}

pub fn compact(ctx: &Ctx, command: CompactCommand) -> Result<()> {
    let meta = FileSessionStore::new(ctx.layout.clone());
    match command {
        CompactCommand::Check { roles } => {
            let roles = ctx.roles_or_all(roles)?;
            let monitor = CompactionMonitor::new(ctx.config.compact.clone(), ctx.layout.clone(), &meta);
            let now = Utc::now();
            for role in &roles {
                let sizes = monitor.sizes(&ctx.session, role);
                let hours = monitor.hours_since_compaction(&ctx.session, role, now);
                println!(
                    "{:<10} {:>9}  last compacted: {}",
                    role,
                    format_bytes(sizes.total()),
                    format_elapsed(hours)
                );
            }
            // A one-shot check has no prior alerts to dedupe against.
            let mut seen = HashMap::new();
            let alerts = monitor.evaluate(&ctx.session, &roles, now, &mut seen, Duration::ZERO);
            for alert in alerts {
                println!("{}", alert.message);
            }
        }
        CompactCommand::Done { role } => {
            ctx.check_role(&role)?;
            let m = meta.record_compaction(&ctx.session, &role, Utc::now())?;
            println!("{} compacted ({} total)", role, m.compaction_count);
        }
    }
    Ok(())
}

pub fn harness(ctx: &Ctx, command: HarnessCommand) -> Result<()> {
    let dispatcher = ctx.dispatcher();
    let registry = dispatcher.harness();
    match command {
        HarnessCommand::Attach { role, pid } => {
            ctx.check_role(&role)?;
            registry.attach(&ctx.session, &role, pid)?;
            println!("Attached {} (pid {})", role, pid);
        }
        HarnessCommand::Detach { role } => {
            if registry.detach(&ctx.session, &role)? {
                println!("Detached {}", role);
            } else {
                println!("No harness attached to {}", role);
            }
        }
    }
    Ok(())
}

/// Poll forever: fire due cron entries, alert grown inboxes, and surface
/// compaction alerts on each role's pane.
pub fn watch(ctx: &Ctx, interval: Duration) -> Result<()> {
    let dispatcher = ctx.dispatcher();
    let meta = FileSessionStore::new(ctx.layout.clone());
    let monitor = CompactionMonitor::new(ctx.config.compact.clone(), ctx.layout.clone(), &meta);
    let cooldown = ctx.config.compact_alert_cooldown();
    let mut seen = HashMap::new();

    let now = Utc::now();
    for role in &ctx.config.roles {
        meta.ensure_started(&ctx.session, role, now)
            .with_context(|| format!("Failed to record start for {}", role))?;
    }
    info!(session = %ctx.session, interval = ?interval, "watching");

    loop {
        let now = Utc::now();

        let store = CronStore::for_session(&ctx.config, &ctx.layout, &ctx.session);
        let scheduler =
            CronScheduler::new(&ctx.session, store, &ctx.bus).with_dispatcher(&dispatcher);
        match scheduler.tick(now) {
            Ok(report) if !report.fired.is_empty() => {
                info!(fired = report.fired.len(), "cron tick");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "cron tick failed"),
        }

        for (role, result) in dispatcher.notify_all(&ctx.session, &ctx.config.roles) {
            if let Err(e) = result {
                warn!(role = %role, error = %e, "inbox alert failed");
            }
        }

        for alert in monitor.evaluate(&ctx.session, &ctx.config.roles, now, &mut seen, cooldown) {
            warn!(role = %alert.role, "{}", alert.message);
            if let Err(e) = dispatcher.show_status(&ctx.session, &alert.role, &alert.message) {
                warn!(role = %alert.role, error = %e, "compaction alert not shown");
            }
        }

        std::thread::sleep(interval);
    }
}

fn describe(outcome: NotifyOutcome) -> String {
    match outcome {
        NotifyOutcome::HarnessAttached => "harness attached".into(),
        NotifyOutcome::Suppressed(reason) => format!("suppressed ({:?})", reason),
        NotifyOutcome::Delivered(delivery) => format!("delivered ({:?})", delivery),
    }
}
