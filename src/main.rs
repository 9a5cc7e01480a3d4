use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use tv_screensaver::config::Configuration;
use tv_screensaver::events::ScreensaverCommand;
use tv_screensaver::host::{HostHandle, PlaybackFlag};
use tv_screensaver::platform::overlay::{KioskDisplay, OverlayReport};
use tv_screensaver::platform::screensaver::CommandScreensaver;
use tv_screensaver::prefs::PreferenceStore;
use tv_screensaver::screensaver::{Collaborators, ScreensaverManager};
use tv_screensaver::tasks;

#[derive(Debug, Parser)]
#[command(
    name = "tv-screensaver",
    version,
    about = "Dims the TV after a period without input or playback"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Show the dim overlay for N seconds, restore it, and exit
    #[arg(long = "dim-test", value_name = "SECONDS")]
    dim_test: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args { config, dim_test } = Args::parse();

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        config.display(),
        cfg
    );

    if let Some(seconds) = dim_test {
        return run_dim_test(&cfg, seconds).await;
    }

    let prefs = Arc::new(match &cfg.preferences_path {
        Some(path) => PreferenceStore::open(path, cfg.dimming_timeout)
            .context("failed to load dimming preferences")?,
        None => PreferenceStore::fixed(cfg.dimming_timeout),
    });
    let display = Arc::new(KioskDisplay::new(cfg.overlay.clone()));
    let playback = Arc::new(PlaybackFlag::default());
    let platform = Arc::new(CommandScreensaver::new(&cfg.platform_screensaver));

    let manager = ScreensaverManager::new(
        Collaborators {
            host: HostHandle::from_arc(&display),
            playback: playback.clone(),
            prefs: prefs.clone(),
            platform,
        },
        Instant::now(),
    );
    let driver = tasks::driver::Driver::new(manager, playback, prefs);

    let (control_tx, control_rx) = mpsc::channel::<ScreensaverCommand>(32); // Socket/Input/Signals -> Driver
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        spawn_signal_forwarder(
            SignalKind::user_defined1(),
            "SIGUSR1",
            ScreensaverCommand::UserActivity,
            control_tx.clone(),
            cancel.clone(),
        );
        spawn_signal_forwarder(
            SignalKind::hangup(),
            "SIGHUP",
            ScreensaverCommand::ReloadPreferences,
            control_tx.clone(),
            cancel.clone(),
        );
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = sigterm.recv() => {
                                tracing::info!("SIGTERM received; initiating shutdown");
                                cancel.cancel();
                            }
                        }
                    }
                    Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
                }
            });
        }
    }

    let watched = tasks::input::spawn(
        &cfg.input.devices,
        cfg.input.activity_throttle,
        control_tx.clone(),
    );
    if !cfg.input.devices.is_empty() && watched == 0 {
        tracing::warn!("none of the configured input devices could be opened");
    }

    let mut tasks = JoinSet::new();

    // Control socket
    tasks.spawn({
        let path = cfg.control_socket_path.clone();
        let control_tx = control_tx.clone();
        let cancel = cancel.clone();
        async move {
            tasks::control::run(path, control_tx, cancel)
                .await
                .context("control socket task failed")
        }
    });

    // Preferences watcher
    if let Some(path) = cfg.preferences_path.clone() {
        tasks.spawn({
            let control_tx = control_tx.clone();
            let cancel = cancel.clone();
            async move {
                tasks::prefs_watch::run(path, control_tx, cancel)
                    .await
                    .context("preferences watcher failed")
            }
        });
    }

    // Screensaver driver
    tasks.spawn({
        let cancel = cancel.clone();
        async move {
            tasks::driver::run(driver, control_rx, cancel)
                .await
                .context("screensaver driver failed")
        }
    });

    drop(control_tx);

    // A failing task takes the rest down with it
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
        cancel.cancel();
    }

    Ok(())
}

#[cfg(unix)]
fn spawn_signal_forwarder(
    kind: SignalKind,
    name: &'static str,
    command: ScreensaverCommand,
    control: mpsc::Sender<ScreensaverCommand>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        match signal(kind) {
            Ok(mut stream) => loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = stream.recv() => {
                        if received.is_none() {
                            break;
                        }
                        tracing::info!(?command, "{name} received");
                        if let Err(err) = control.send(command).await {
                            tracing::warn!("failed to forward {name}: {err}");
                            break;
                        }
                    }
                }
            },
            Err(err) => tracing::warn!("failed to register {name} handler: {err}"),
        }
    });
}

async fn run_dim_test(cfg: &Configuration, seconds: u64) -> Result<()> {
    if !cfg.overlay.is_configured() {
        bail!("--dim-test requires an overlay backlight-path or show/hide command");
    }
    let display = KioskDisplay::new(cfg.overlay.clone());
    let overlay = display
        .overlay()
        .context("display could not attach a dim overlay")?;

    tracing::info!(duration = seconds, "dim-test: showing overlay");
    let shown = overlay.apply(true);
    log_overlay_report("dim-test show", &shown);
    if !shown.success() {
        bail!("dim-test show failed");
    }

    sleep(Duration::from_secs(seconds)).await;

    tracing::info!("dim-test: hiding overlay");
    let hidden = overlay.apply(false);
    log_overlay_report("dim-test hide", &hidden);
    if !hidden.success() {
        bail!("dim-test hide failed");
    }

    tracing::info!("dim-test completed successfully");
    Ok(())
}

fn log_overlay_report(label: &str, report: &OverlayReport) {
    tracing::info!(
        label,
        success = report.success(),
        sysfs = ?report.sysfs.as_ref().map(|s| (s.path.display().to_string(), s.value.clone(), s.success)),
        command = ?report.command.as_ref().map(|c| (c.command.clone(), c.exit_code)),
        "overlay report"
    );
}
