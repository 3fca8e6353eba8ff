//! The long-running flavor of the protection pass: same sweep, on a timer,
//! until Ctrl-C. Assumes it is the only instance working this account.

use log::{info, warn};
use tokio::signal;
use tokio::sync::watch;
use tokio::time::{Duration, interval};

use crate::error::Result;
use crate::protect::{GuardMode, GuardProfile, protect_pass};
use crate::terminal::Terminal;
use crate::types::Timeframe;

const MIN_INTERVAL_SECS: u64 = 5;

pub struct MonitorOptions {
    pub interval_secs: u64,
    pub mode: GuardMode,
    pub profile: GuardProfile,
    pub symbol: Option<String>,
    pub timeframe: Timeframe,
    pub dry_run: bool,
}

pub async fn run(terminal: &mut Terminal, options: MonitorOptions) -> Result<()> {
    let every = options.interval_secs.max(MIN_INTERVAL_SECS);
    info!(
        "Monitor started: {:?} pass every {} s (single instance per account assumed)",
        options.mode, every
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let mut ticker = interval(Duration::from_secs(every));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                //the pass runs to completion here, a Ctrl-C mid-pass is
                //picked up on the next loop turn
                match protect_pass(
                    terminal,
                    &options.profile,
                    options.mode,
                    options.symbol.as_deref(),
                    options.timeframe,
                    options.dry_run,
                )
                .await
                {
                    Ok(summary) if summary.moved > 0 => {
                        info!("{} stop-loss update(s) applied", summary.moved);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("pass failed: {}", e),
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown received, stopping monitor");
                    return Ok(());
                }
            }
        }
    }
}
