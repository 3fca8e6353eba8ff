//! The consolidated evaluate-and-adjust pass: scan open positions, compute
//! profit in pips, and ratchet stop-losses that qualify. One pure decision
//! function replaces the old per-script threshold tables.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::str::FromStr;

use log::{info, warn};
use rustc_hash::FxHasher;
use serde::Deserialize;
use tokio::time::{Duration, sleep};

use crate::atr::Atr;
use crate::consts::{RETRY_ATTEMPTS, RETRY_PAUSE_MS};
use crate::error::{Error, Result};
use crate::pip::{pip_size, profit_pips};
use crate::terminal::Terminal;
use crate::types::{Position, Side, SymbolSpec, Tick, Timeframe, TradeRequest};

/// One set of protection thresholds, in pips. Replaces the constant blocks
/// that used to be copy-pasted per script; extra sets load from TOML.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GuardProfile {
    pub trigger_pips: f64,
    pub offset_pips: f64,
    pub trail_pips: f64,
    pub min_step_pips: f64,
    pub atr_period: usize,
    pub atr_factor: f64,
}

impl Default for GuardProfile {
    fn default() -> Self {
        BALANCED
    }
}

pub const CONSERVATIVE: GuardProfile = GuardProfile {
    trigger_pips: 30.0,
    offset_pips: 2.0,
    trail_pips: 25.0,
    min_step_pips: 2.0,
    atr_period: 14,
    atr_factor: 2.5,
};

pub const BALANCED: GuardProfile = GuardProfile {
    trigger_pips: 20.0,
    offset_pips: 2.0,
    trail_pips: 15.0,
    min_step_pips: 1.0,
    atr_period: 14,
    atr_factor: 2.0,
};

pub const FAST: GuardProfile = GuardProfile {
    trigger_pips: 10.0,
    offset_pips: 1.0,
    trail_pips: 8.0,
    min_step_pips: 0.5,
    atr_period: 14,
    atr_factor: 1.5,
};

impl GuardProfile {
    pub fn named(name: &str) -> Option<GuardProfile> {
        match name.to_ascii_lowercase().as_str() {
            "conservative" => Some(CONSERVATIVE),
            "balanced" => Some(BALANCED),
            "fast" => Some(FAST),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    Breakeven,
    Trailing,
    AtrTrailing,
}

impl FromStr for GuardMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "breakeven" | "be" => Ok(GuardMode::Breakeven),
            "trailing" | "trail" => Ok(GuardMode::Trailing),
            "atr" => Ok(GuardMode::AtrTrailing),
            other => Err(format!(
                "unknown mode '{}', expected breakeven, trailing or atr",
                other
            )),
        }
    }
}

/// A stop-loss move the broker has not seen yet.
#[derive(Debug, Clone, PartialEq)]
pub struct StopPlan {
    pub ticket: u64,
    pub symbol: String,
    pub new_sl: f64,
    pub tp: f64,
    pub profit_pips: f64,
}

/// Decide whether this position earns a stop move. Pure and idempotent:
/// feeding the same snapshot twice plans the same move or none at all.
///
/// The ratchet rule is absolute: a BUY stop only ever moves up, a SELL stop
/// only ever moves down. Moves below `min_step_pips`, or closer to the
/// price than the broker's stops_level, are skipped.
pub fn plan_stop(
    position: &Position,
    tick: &Tick,
    spec: &SymbolSpec,
    profile: &GuardProfile,
    mode: GuardMode,
    atr: Option<f64>,
) -> Option<StopPlan> {
    let pip = pip_size(&position.symbol);
    let current = tick.close_price(position.side);
    let pips = profit_pips(position.side, position.price_open, current, pip);
    if pips < profile.trigger_pips {
        return None;
    }

    let candidate = match mode {
        GuardMode::Breakeven => match position.side {
            Side::Buy => position.price_open + profile.offset_pips * pip,
            Side::Sell => position.price_open - profile.offset_pips * pip,
        },
        GuardMode::Trailing => trail(position.side, current, profile.trail_pips * pip),
        GuardMode::AtrTrailing => trail(position.side, current, atr? * profile.atr_factor),
    };
    let candidate = spec.round_price(candidate);

    if !improves(position, candidate, profile.min_step_pips * pip) {
        return None;
    }
    if (current - candidate).abs() < spec.min_stop_distance() {
        return None;
    }

    Some(StopPlan {
        ticket: position.ticket,
        symbol: position.symbol.clone(),
        new_sl: candidate,
        tp: position.tp,
        profit_pips: pips,
    })
}

fn trail(side: Side, current: f64, distance: f64) -> f64 {
    match side {
        Side::Buy => current - distance,
        Side::Sell => current + distance,
    }
}

//never loosen: candidate must tighten the stop by at least min_step
fn improves(position: &Position, candidate: f64, min_step: f64) -> bool {
    if !position.has_sl() {
        return true;
    }
    match position.side {
        Side::Buy => candidate > position.sl && candidate - position.sl >= min_step,
        Side::Sell => candidate < position.sl && position.sl - candidate >= min_step,
    }
}

/// Push one planned move to the broker, retrying transient failures a few
/// times before giving up. Rejections other than requote-class are final.
pub async fn apply(terminal: &mut Terminal, plan: &StopPlan) -> Result<()> {
    let request = TradeRequest::Sltp {
        ticket: plan.ticket,
        symbol: plan.symbol.clone(),
        sl: plan.new_sl,
        tp: plan.tp,
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        match terminal.order_send(&request).await {
            Ok(_) => return Ok(()),
            Err(e) if attempt < RETRY_ATTEMPTS && e.is_transient() => {
                warn!(
                    "modify #{} attempt {} failed: {}, retrying",
                    plan.ticket, attempt, e
                );
                sleep(Duration::from_millis(RETRY_PAUSE_MS)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PassSummary {
    pub examined: usize,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
}

type SymbolMap<V> = HashMap<String, V, BuildHasherDefault<FxHasher>>;

/// One full sweep: read positions, recompute profit from the latest tick,
/// plan, apply. Failures on one position are logged and never stop the pass.
pub async fn protect_pass(
    terminal: &mut Terminal,
    profile: &GuardProfile,
    mode: GuardMode,
    symbol_filter: Option<&str>,
    timeframe: Timeframe,
    dry_run: bool,
) -> Result<PassSummary> {
    let positions = terminal.positions().await?;
    let mut summary = PassSummary::default();
    let mut specs: SymbolMap<SymbolSpec> = HashMap::default();
    let mut atr_cache: SymbolMap<Option<f64>> = HashMap::default();

    for position in &positions {
        if let Some(filter) = symbol_filter {
            if !position.symbol.eq_ignore_ascii_case(filter) {
                continue;
            }
        }
        summary.examined += 1;

        let spec = if let Some(spec) = specs.get(&position.symbol).copied() {
            spec
        } else {
            match terminal.symbol_info(&position.symbol).await {
                Ok(spec) => {
                    specs.insert(position.symbol.clone(), spec);
                    spec
                }
                Err(e) => {
                    warn!("#{} {}: symbol_info failed: {}", position.ticket, position.symbol, e);
                    summary.failed += 1;
                    continue;
                }
            }
        };
        if !spec.trade_allowed {
            info!("#{} {}: trading disabled, skipped", position.ticket, position.symbol);
            summary.skipped += 1;
            continue;
        }

        let tick = match terminal.tick(&position.symbol).await {
            Ok(tick) => tick,
            Err(Error::NoTick(_)) => {
                info!("#{} {}: no live tick, skipped", position.ticket, position.symbol);
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!("#{} {}: tick failed: {}", position.ticket, position.symbol, e);
                summary.failed += 1;
                continue;
            }
        };

        let atr = if mode == GuardMode::AtrTrailing {
            if let Some(cached) = atr_cache.get(&position.symbol).copied() {
                cached
            } else {
                let count = (profile.atr_period as u32) * 4;
                let value = match terminal.candles(&position.symbol, timeframe, count).await {
                    Ok(candles) => Atr::new(profile.atr_period).compute(&candles),
                    Err(e) => {
                        warn!("#{} {}: candles failed: {}", position.ticket, position.symbol, e);
                        None
                    }
                };
                atr_cache.insert(position.symbol.clone(), value);
                value
            }
        } else {
            None
        };

        match plan_stop(position, &tick, &spec, profile, mode, atr) {
            Some(plan) => {
                if dry_run {
                    info!(
                        "#{} {}: would move SL to {} ({:+.1} pips)",
                        plan.ticket, plan.symbol, plan.new_sl, plan.profit_pips
                    );
                    summary.moved += 1;
                } else {
                    match apply(terminal, &plan).await {
                        Ok(()) => {
                            info!(
                                "#{} {}: SL -> {} ({:+.1} pips)",
                                plan.ticket, plan.symbol, plan.new_sl, plan.profit_pips
                            );
                            summary.moved += 1;
                        }
                        Err(e) => {
                            warn!("#{} {}: modify failed: {}", plan.ticket, plan.symbol, e);
                            summary.failed += 1;
                        }
                    }
                }
            }
            None => {
                summary.skipped += 1;
            }
        }
    }

    info!(
        "Pass complete: {} examined, {} moved, {} skipped, {} failed",
        summary.examined, summary.moved, summary.skipped, summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_position(entry: f64, current: f64, sl: f64) -> Position {
        Position {
            ticket: 1,
            symbol: "EURUSD".to_string(),
            side: Side::Buy,
            volume: 0.1,
            price_open: entry,
            price_current: current,
            sl,
            tp: 0.0,
            profit: 0.0,
            magic: 0,
            time: 0,
        }
    }

    fn sell_position(entry: f64, current: f64, sl: f64) -> Position {
        Position {
            side: Side::Sell,
            ..buy_position(entry, current, sl)
        }
    }

    fn tick_at(price: f64) -> Tick {
        Tick {
            time: 0,
            bid: price,
            ask: price,
        }
    }

    fn spec() -> SymbolSpec {
        SymbolSpec {
            digits: 5,
            point: 0.00001,
            stops_level: 0,
            trade_allowed: true,
        }
    }

    fn profile() -> GuardProfile {
        GuardProfile {
            trigger_pips: 20.0,
            offset_pips: 2.0,
            trail_pips: 15.0,
            min_step_pips: 1.0,
            atr_period: 14,
            atr_factor: 2.0,
        }
    }

    #[test]
    fn test_breakeven_at_trigger() {
        //25 pips of profit, trigger 20, offset 2 -> SL at entry + 2 pips
        let position = buy_position(1.10000, 1.10250, 0.0);
        let plan = plan_stop(
            &position,
            &tick_at(1.10250),
            &spec(),
            &profile(),
            GuardMode::Breakeven,
            None,
        )
        .unwrap();
        assert!((plan.new_sl - 1.10020).abs() < 1e-9);
        assert!((plan.profit_pips - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_below_trigger_plans_nothing() {
        let position = buy_position(1.10000, 1.10150, 0.0);
        let plan = plan_stop(
            &position,
            &tick_at(1.10150),
            &spec(),
            &profile(),
            GuardMode::Breakeven,
            None,
        );
        assert!(plan.is_none());
    }

    #[test]
    fn test_ratchet_never_loosens_buy() {
        //existing SL already above the breakeven candidate
        let position = buy_position(1.10000, 1.10300, 1.10100);
        let plan = plan_stop(
            &position,
            &tick_at(1.10300),
            &spec(),
            &profile(),
            GuardMode::Breakeven,
            None,
        );
        assert!(plan.is_none());
    }

    #[test]
    fn test_ratchet_never_loosens_sell() {
        //SELL in profit, existing SL already below the candidate
        let position = sell_position(1.10000, 1.09700, 1.09900);
        let plan = plan_stop(
            &position,
            &tick_at(1.09700),
            &spec(),
            &profile(),
            GuardMode::Breakeven,
            None,
        );
        assert!(plan.is_none());
    }

    #[test]
    fn test_sell_breakeven_offsets_down() {
        let position = sell_position(1.10000, 1.09700, 0.0);
        let plan = plan_stop(
            &position,
            &tick_at(1.09700),
            &spec(),
            &profile(),
            GuardMode::Breakeven,
            None,
        )
        .unwrap();
        assert!((plan.new_sl - 1.09980).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_follows_price() {
        let position = buy_position(1.10000, 1.10300, 1.10020);
        let plan = plan_stop(
            &position,
            &tick_at(1.10300),
            &spec(),
            &profile(),
            GuardMode::Trailing,
            None,
        )
        .unwrap();
        //current - 15 pips
        assert!((plan.new_sl - 1.10150).abs() < 1e-9);
    }

    #[test]
    fn test_min_step_skips_tiny_improvements() {
        //trailing candidate improves the stop by less than one pip
        let position = buy_position(1.10000, 1.10300, 1.10145);
        let plan = plan_stop(
            &position,
            &tick_at(1.10300),
            &spec(),
            &profile(),
            GuardMode::Trailing,
            None,
        );
        assert!(plan.is_none());
    }

    #[test]
    fn test_stops_level_blocks_close_candidates() {
        let mut tight = spec();
        tight.stops_level = 200; //200 points = 20 pips on a 5-digit symbol
        let position = buy_position(1.10000, 1.10300, 0.0);
        let plan = plan_stop(
            &position,
            &tick_at(1.10300),
            &tight,
            &profile(),
            GuardMode::Trailing,
            None,
        );
        //candidate sits 15 pips from price, inside the 20 pip floor
        assert!(plan.is_none());
    }

    #[test]
    fn test_atr_mode_needs_a_reading() {
        let position = buy_position(1.10000, 1.10300, 0.0);
        let none = plan_stop(
            &position,
            &tick_at(1.10300),
            &spec(),
            &profile(),
            GuardMode::AtrTrailing,
            None,
        );
        assert!(none.is_none());

        let plan = plan_stop(
            &position,
            &tick_at(1.10300),
            &spec(),
            &profile(),
            GuardMode::AtrTrailing,
            Some(0.0010),
        )
        .unwrap();
        //current - 2 * ATR
        assert!((plan.new_sl - 1.10100).abs() < 1e-9);
    }

    #[test]
    fn test_profiles_resolve_by_name() {
        assert!(GuardProfile::named("conservative").is_some());
        assert!(GuardProfile::named("BALANCED").is_some());
        assert!(GuardProfile::named("warp-speed").is_none());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("breakeven".parse::<GuardMode>().unwrap(), GuardMode::Breakeven);
        assert_eq!("trail".parse::<GuardMode>().unwrap(), GuardMode::Trailing);
        assert_eq!("atr".parse::<GuardMode>().unwrap(), GuardMode::AtrTrailing);
        assert!("martingale".parse::<GuardMode>().is_err());
    }
}
