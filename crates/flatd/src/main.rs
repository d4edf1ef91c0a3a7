// # flatd - flat overlay node agent
//
// Thin integration layer around flat-core. It holds no selection or
// reconciliation logic of its own.
//
// The flatd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Resolving the interface that carries overlay traffic (once, at startup)
// 3. Binding the node address of the current lease to the overlay link
// 4. Re-running that binding on every resync tick, and early when the lease
//    is about to expire, until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Interface selection
// - `FLAT_IFACE`: Comma-separated interface names or addresses, tried in order
// - `FLAT_IFACE_REGEX`: Comma-separated interface name regexes
// - `FLAT_IFACE_CAN_REACH`: Pick the interface that routes to this address
// - `FLAT_PUBLIC_IP`: IPv4 address advertised to other nodes
// - `FLAT_PUBLIC_IPV6`: IPv6 address advertised to other nodes
// - `FLAT_ENABLE_IPV6`: Also resolve and bind IPv6 (true/false)
//
// ### Lease
// - `FLAT_SUBNET_FILE`: JSON network configuration (default /run/flat/subnet.json)
// - `FLAT_OVERLAY_LINK`: Link receiving the node address (default: selected interface)
// - `FLAT_RESYNC_SECS`: Seconds between reconciliation passes (default 60)
// - `FLAT_LEASE_RENEW_MARGIN_SECS`: Re-read the lease this long before it expires (default 60)
//
// ### Logging
// - `FLAT_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export FLAT_IFACE=eth0
// export FLAT_SUBNET_FILE=/run/flat/subnet.json
// export FLAT_OVERLAY_LINK=flat0
//
// flatd
// ```

use anyhow::{Context, Result, anyhow};
use flat_core::traits::{InterfaceTable, fetch_network_config};
use flat_core::{
    AgentConfig, FileSubnetManager, HostNetwork, InterfaceResolver, LinkAddressReconciler,
    NetworkConfig, ReconcileOutcome, ResolvedInterface,
};
use std::env;
use std::fmt::Display;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_SUBNET_FILE: &str = "/run/flat/subnet.json";

/// Lower bound on the early-renewal delay
const MIN_RENEW_DELAY: Duration = Duration::from_secs(1);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum FlatExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<FlatExitCode> for ExitCode {
    fn from(code: FlatExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    agent: AgentConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let subnet_file = lookup("FLAT_SUBNET_FILE")
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUBNET_FILE.to_string());

        let mut agent = AgentConfig::new(subnet_file);
        agent.selection.interfaces = list(lookup("FLAT_IFACE"));
        agent.selection.interface_regexes = list(lookup("FLAT_IFACE_REGEX"));
        agent.selection.can_reach = parsed(&lookup, "FLAT_IFACE_CAN_REACH")?;
        agent.selection.public_ip = parsed(&lookup, "FLAT_PUBLIC_IP")?;
        agent.selection.public_ipv6 = parsed(&lookup, "FLAT_PUBLIC_IPV6")?;
        agent.selection.enable_ipv6 = flag(&lookup, "FLAT_ENABLE_IPV6")?;
        agent.overlay_link = lookup("FLAT_OVERLAY_LINK").filter(|link| !link.is_empty());
        if let Some(secs) = parsed(&lookup, "FLAT_RESYNC_SECS")? {
            agent.resync_interval_secs = secs;
        }
        if let Some(secs) = parsed(&lookup, "FLAT_LEASE_RENEW_MARGIN_SECS")? {
            agent.lease_renew_margin_secs = secs;
        }

        Ok(Self {
            agent,
            log_level: lookup("FLAT_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.agent.validate()?;

        if !(1..=86_400).contains(&self.agent.resync_interval_secs) {
            anyhow::bail!(
                "FLAT_RESYNC_SECS must be between 1 and 86400 seconds. Got: {}",
                self.agent.resync_interval_secs
            );
        }

        if self.agent.lease_renew_margin_secs > 86_400 {
            anyhow::bail!(
                "FLAT_LEASE_RENEW_MARGIN_SECS must be at most 86400 seconds. Got: {}",
                self.agent.lease_renew_margin_secs
            );
        }

        if self.agent.selection.public_ipv6.is_some() && !self.agent.selection.enable_ipv6 {
            anyhow::bail!("FLAT_PUBLIC_IPV6 is set but FLAT_ENABLE_IPV6 is not");
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => Err(anyhow!(
                "FLAT_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            )),
        }
    }
}

/// Split a comma-separated variable, dropping empty entries
fn list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|e| anyhow!("{key} is not valid ({value:?}): {e}"))
        })
        .transpose()
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match lookup(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(anyhow!("{key} must be true or false. Got: {other}")),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return FlatExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return FlatExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FlatExitCode::ConfigError.into();
    }

    info!("Starting flatd");
    info!(
        "Subnet file: {}, resync every {}s",
        config.agent.subnet_file.display(),
        config.agent.resync_interval_secs
    );

    let host = match open_host() {
        Ok(host) => host,
        Err(e) => {
            error!("{:#}", e);
            return FlatExitCode::ConfigError.into();
        }
    };

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FlatExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config.agent, host).await {
            error!("Daemon error: {:#}", e);
            FlatExitCode::RuntimeError
        } else {
            FlatExitCode::CleanShutdown
        }
    });

    result.into()
}

#[cfg(feature = "netlink")]
fn open_host() -> Result<Arc<dyn HostNetwork>> {
    info!("Using rtnetlink host access");
    Ok(Arc::new(flat_netlink::NetlinkHost::new()))
}

#[cfg(not(feature = "netlink"))]
fn open_host() -> Result<Arc<dyn HostNetwork>> {
    anyhow::bail!("flatd was built without host network access (enable the `netlink` feature)")
}

/// Run the daemon
async fn run_daemon(config: AgentConfig, host: Arc<dyn HostNetwork>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Shutdown error: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    serve(config, host, shutdown_rx).await
}

/// Resolve the uplink, then keep the lease applied until `shutdown_rx` flips
async fn serve(
    config: AgentConfig,
    host: Arc<dyn HostNetwork>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let resolved = resolve_interface(&host, &config).await?;
    let link_name = config
        .overlay_link
        .clone()
        .unwrap_or_else(|| resolved.interface.name.clone());
    info!("Overlay addresses will be bound to {}", link_name);

    let manager = FileSubnetManager::new(&config.subnet_file);
    let enable_ipv6 = config.selection.enable_ipv6;
    let margin = chrono::Duration::seconds(config.lease_renew_margin_secs as i64);

    // A startup failure is fatal; later ones are retried on the next tick
    let mut lease =
        match sync_once(&host, &manager, &link_name, &resolved, enable_ipv6, &shutdown_rx).await {
            Ok(lease) => lease,
            Err(_) if *shutdown_rx.borrow() => {
                info!("Shutdown requested before the first sync");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

    let period = Duration::from_secs(config.resync_interval_secs);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = IntervalStream::new(interval);
    let mut stop = shutdown_rx.clone();

    info!("Ready, resyncing every {:?}", period);

    loop {
        let renew = renew_delay(&lease, margin, chrono::Utc::now());

        tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => break,
            Some(_) = ticks.next() => debug!("Resync tick"),
            _ = tokio::time::sleep(renew.unwrap_or(period)), if renew.is_some() => {
                info!("Lease {} expires within {}s, re-reading it early", lease.subnet, margin.num_seconds());
            }
        }

        match sync_once(&host, &manager, &link_name, &resolved, enable_ipv6, &shutdown_rx).await {
            Ok(config) => {
                if config.subnet != lease.subnet {
                    info!("Lease changed from {} to {}", lease.subnet, config.subnet);
                }
                lease = config;
            }
            Err(_) if *shutdown_rx.borrow() => break,
            Err(e) => warn!("Resync failed, will retry: {:#}", e),
        }
    }

    info!("Shutting down flatd");
    Ok(())
}

async fn resolve_interface(
    host: &Arc<dyn HostNetwork>,
    config: &AgentConfig,
) -> Result<ResolvedInterface> {
    let resolver = InterfaceResolver::new(Arc::clone(host));
    let selection = config.selection.clone();

    let resolved = tokio::task::spawn_blocking(move || resolver.resolve(&selection))
        .await
        .context("Interface resolution task failed")?
        .context("Failed to select an interface")?;

    info!(
        "Selected {} with address {} (public {})",
        resolved.interface, resolved.address, resolved.public_address
    );
    if let (Some(v6), Some(public_v6)) = (resolved.ipv6_address, resolved.public_ipv6_address) {
        info!("IPv6 address {} (public {})", v6, public_v6);
    }
    Ok(resolved)
}

/// Fetch the lease and bind its node address to the overlay link
async fn sync_once(
    host: &Arc<dyn HostNetwork>,
    manager: &FileSubnetManager,
    link_name: &str,
    uplink: &ResolvedInterface,
    enable_ipv6: bool,
    shutdown: &watch::Receiver<bool>,
) -> Result<NetworkConfig> {
    let config = fetch_network_config(manager, cancelled(shutdown.clone()))
        .await
        .with_context(|| format!("Failed to read {}", manager.path().display()))?;

    let host = Arc::clone(host);
    let link_name = link_name.to_string();
    let lease = config.clone();
    let uplink = uplink.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        // Looked up on every pass: the link may have been recreated
        let link = host.interface_by_name(&link_name)?;
        LinkAddressReconciler::new(host).apply_lease(&lease, &link, &uplink, enable_ipv6)
    })
    .await
    .context("Reconciliation task failed")?
    .context("Failed to reconcile overlay addresses")?;

    report(&config, &outcome.v4);
    if let Some(v6) = &outcome.v6 {
        report(&config, v6);
    }
    Ok(config)
}

fn report(config: &NetworkConfig, outcome: &ReconcileOutcome) {
    if outcome.is_noop() {
        debug!("Lease {} already applied", config.subnet);
    } else {
        info!(
            "Applied lease {}: removed {} stale address(es), added: {}",
            config.subnet,
            outcome.removed.len(),
            outcome.added
        );
    }
}

/// Completes once shutdown has been requested (or its sender is gone)
async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

/// Time until the lease enters its renew margin, if it has an expiry that
/// has not already passed
fn renew_delay(
    lease: &NetworkConfig,
    margin: chrono::Duration,
    now: chrono::DateTime<chrono::Utc>,
) -> Option<Duration> {
    let expiry = lease.expiration.filter(|expiry| *expiry > now)?;
    let until = (expiry - margin - now).to_std().unwrap_or(Duration::ZERO);
    Some(until.max(MIN_RENEW_DELAY))
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    // Set up signal handlers for SIGTERM and SIGINT
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
