use std::path::PathBuf;
use std::process;

use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use log::error;

use mt5_rust_bot::{
    Advisor, Atr, Error, GuardMode, MonitorOptions, Result, Settings, Side, Terminal, TradeRequest,
    Verdict, atr_pips, build_prompt,
    consts::{ATR_SL_FACTOR, ATR_TP_FACTOR, BOT_MAGIC, DEFAULT_DEVIATION,
             DEFAULT_MONITOR_INTERVAL_SECS},
    load_profiles, monitor, pip_size, profit_pips, protect_pass, resolve_profile,
    types::Timeframe,
};

#[derive(Parser)]
#[command(
    name = "mt5-bot",
    about = "Stop-loss guardian and LLM advisor for a MetaTrader 5 account",
    version
)]
struct Cli {
    /// TOML file with extra guard profiles
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Account summary and open positions
    Report,
    /// One protection pass over open positions
    Protect(ProtectArgs),
    /// Re-run the protection pass on an interval until Ctrl-C
    Monitor {
        #[command(flatten)]
        protect: ProtectArgs,
        /// Seconds between passes
        #[arg(long, default_value_t = DEFAULT_MONITOR_INTERVAL_SECS)]
        interval: u64,
    },
    /// Current ATR for a symbol
    Atr {
        symbol: String,
        #[arg(long, default_value = "M15")]
        timeframe: Timeframe,
        #[arg(long, default_value_t = 14)]
        period: usize,
    },
    /// Ask the configured Ollama model for a BUY/SELL/HOLD verdict
    Advise {
        symbol: String,
        #[arg(long, default_value = "M15")]
        timeframe: Timeframe,
        /// Submit a market order when the verdict is BUY or SELL
        #[arg(long)]
        execute: bool,
        #[arg(long, default_value_t = 0.01)]
        volume: f64,
    },
    /// Close an open position by ticket
    Close { ticket: u64 },
    /// Closed-deal summary for the last N days
    History {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

#[derive(Args)]
struct ProtectArgs {
    /// breakeven, trailing or atr
    #[arg(long, default_value = "breakeven")]
    mode: GuardMode,
    /// conservative, balanced, fast, or a profile from --config
    #[arg(long, default_value = "balanced")]
    profile: String,
    /// Only touch positions on this symbol
    #[arg(long)]
    symbol: Option<String>,
    /// Timeframe for the atr mode
    #[arg(long, default_value = "M15")]
    timeframe: Timeframe,
    /// Plan only, send nothing to the broker
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env()?;
    let profiles = load_profiles(cli.config.as_deref())?;

    match cli.command {
        Command::Report => report(&settings).await,
        Command::Protect(args) => {
            let profile = resolve_profile(&args.profile, &profiles)?;
            let mut terminal = Terminal::connect(&settings).await?;
            let summary = protect_pass(
                &mut terminal,
                &profile,
                args.mode,
                args.symbol.as_deref(),
                args.timeframe,
                args.dry_run,
            )
            .await?;
            println!(
                "{} examined, {} moved, {} skipped, {} failed",
                summary.examined, summary.moved, summary.skipped, summary.failed
            );
            terminal.shutdown().await;
            Ok(())
        }
        Command::Monitor { protect, interval } => {
            let profile = resolve_profile(&protect.profile, &profiles)?;
            let mut terminal = Terminal::connect(&settings).await?;
            let result = monitor::run(
                &mut terminal,
                MonitorOptions {
                    interval_secs: interval,
                    mode: protect.mode,
                    profile,
                    symbol: protect.symbol,
                    timeframe: protect.timeframe,
                    dry_run: protect.dry_run,
                },
            )
            .await;
            terminal.shutdown().await;
            result
        }
        Command::Atr {
            symbol,
            timeframe,
            period,
        } => atr_report(&settings, &symbol, timeframe, period).await,
        Command::Advise {
            symbol,
            timeframe,
            execute,
            volume,
        } => advise(&settings, &symbol, timeframe, execute, volume).await,
        Command::Close { ticket } => close(&settings, ticket).await,
        Command::History { days } => history(&settings, days).await,
    }
}

async fn report(settings: &Settings) -> Result<()> {
    let mut terminal = Terminal::connect(settings).await?;
    let account = terminal.account_info().await?;
    let positions = terminal.positions().await?;

    println!(
        "Account {} @ {} | balance {:.2} {} | equity {:.2} | free margin {:.2}",
        account.login,
        account.server,
        account.balance,
        account.currency,
        account.equity,
        account.margin_free
    );

    if positions.is_empty() {
        println!("No open positions.");
    } else {
        println!(
            "{:<10} {:<10} {:<5} {:>7} {:>11} {:>11} {:>11} {:>11} {:>8} {:>10}",
            "TICKET", "SYMBOL", "SIDE", "VOLUME", "ENTRY", "CURRENT", "SL", "TP", "PIPS", "PROFIT"
        );
        for position in &positions {
            let pip = pip_size(&position.symbol);
            let pips = profit_pips(
                position.side,
                position.price_open,
                position.price_current,
                pip,
            );
            println!(
                "{:<10} {:<10} {:<5} {:>7.2} {:>11.5} {:>11.5} {:>11.5} {:>11.5} {:>+8.1} {:>+10.2}",
                position.ticket,
                position.symbol,
                position.side,
                position.volume,
                position.price_open,
                position.price_current,
                position.sl,
                position.tp,
                pips,
                position.profit
            );
        }
        let floating: f64 = positions.iter().map(|p| p.profit).sum();
        println!("Floating profit: {:+.2} {}", floating, account.currency);
    }

    terminal.shutdown().await;
    Ok(())
}

async fn atr_report(
    settings: &Settings,
    symbol: &str,
    timeframe: Timeframe,
    period: usize,
) -> Result<()> {
    let mut terminal = Terminal::connect(settings).await?;
    let candles = terminal
        .candles(symbol, timeframe, (period as u32) * 4)
        .await?;
    terminal.shutdown().await;

    let pip = pip_size(symbol);
    match (
        Atr::new(period).compute(&candles),
        atr_pips(&candles, period, pip),
    ) {
        (Some(atr), Some(pips)) => {
            println!(
                "{} {} ATR({}) = {:.5} ({:.1} pips)",
                symbol, timeframe, period, atr, pips
            );
            Ok(())
        }
        _ => Err(Error::Config(format!(
            "not enough {} candles for ATR({})",
            timeframe, period
        ))),
    }
}

async fn advise(
    settings: &Settings,
    symbol: &str,
    timeframe: Timeframe,
    execute: bool,
    volume: f64,
) -> Result<()> {
    let mut terminal = Terminal::connect(settings).await?;
    let tick = terminal.tick(symbol).await?;
    let candles = terminal.candles(symbol, timeframe, 64).await?;
    let atr = Atr::new(14).compute(&candles);

    let advisor = Advisor::new(settings.ollama_url.clone(), settings.ollama_model.clone());
    let prompt = build_prompt(symbol, &tick, &candles, atr);
    let (verdict, text) = advisor.advise(&prompt).await?;

    println!("{} verdict for {}: {}", settings.ollama_model, symbol, verdict);
    println!("Model said: {}", text.trim());

    if execute && verdict != Verdict::Hold {
        let side = match verdict {
            Verdict::Buy => Side::Buy,
            Verdict::Sell => Side::Sell,
            Verdict::Hold => unreachable!(),
        };
        let spec = terminal.symbol_info(symbol).await?;
        let entry = match side {
            Side::Buy => tick.ask,
            Side::Sell => tick.bid,
        };
        let (sl, tp) = match atr {
            Some(atr) => {
                let (sl, tp) = match side {
                    Side::Buy => (entry - atr * ATR_SL_FACTOR, entry + atr * ATR_TP_FACTOR),
                    Side::Sell => (entry + atr * ATR_SL_FACTOR, entry - atr * ATR_TP_FACTOR),
                };
                (spec.round_price(sl), spec.round_price(tp))
            }
            None => (0.0, 0.0),
        };

        let reply = terminal
            .order_send(&TradeRequest::Deal {
                symbol: symbol.to_string(),
                side,
                volume,
                position: None,
                sl,
                tp,
                deviation: DEFAULT_DEVIATION,
                magic: BOT_MAGIC,
                comment: format!("advisor {}", verdict),
            })
            .await?;
        println!(
            "Opened {} {} {:.2} @ {:.5} (deal {})",
            side, symbol, volume, reply.price, reply.deal
        );
    }

    terminal.shutdown().await;
    Ok(())
}

async fn close(settings: &Settings, ticket: u64) -> Result<()> {
    let mut terminal = Terminal::connect(settings).await?;
    let positions = terminal.positions().await?;
    let position = positions
        .into_iter()
        .find(|p| p.ticket == ticket)
        .ok_or(Error::PositionNotFound(ticket))?;

    let reply = terminal
        .order_send(&TradeRequest::Deal {
            symbol: position.symbol.clone(),
            side: !position.side,
            volume: position.volume,
            position: Some(ticket),
            sl: 0.0,
            tp: 0.0,
            deviation: DEFAULT_DEVIATION,
            magic: BOT_MAGIC,
            comment: "close by bot".to_string(),
        })
        .await?;
    println!(
        "Closed #{} {} {:.2} @ {:.5} (deal {})",
        ticket, position.symbol, position.volume, reply.price, reply.deal
    );

    terminal.shutdown().await;
    Ok(())
}

async fn history(settings: &Settings, days: u32) -> Result<()> {
    let mut terminal = Terminal::connect(settings).await?;
    let deals = terminal.history_deals(days).await?;
    terminal.shutdown().await;

    if deals.is_empty() {
        println!("No closed deals in the last {} day(s).", days);
        return Ok(());
    }

    println!(
        "{:<17} {:<10} {:<10} {:<5} {:>7} {:>11} {:>10}",
        "TIME", "TICKET", "SYMBOL", "SIDE", "VOLUME", "PRICE", "PROFIT"
    );
    let mut total = 0.0;
    let mut wins = 0usize;
    for deal in &deals {
        let when = DateTime::from_timestamp(deal.time, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| deal.time.to_string());
        println!(
            "{:<17} {:<10} {:<10} {:<5} {:>7.2} {:>11.5} {:>+10.2}",
            when, deal.ticket, deal.symbol, deal.side, deal.volume, deal.price, deal.profit
        );
        total += deal.profit;
        if deal.profit > 0.0 {
            wins += 1;
        }
    }
    println!(
        "{} deal(s), {} winner(s), net {:+.2} over {} day(s)",
        deals.len(),
        wins,
        total,
        days
    );
    Ok(())
}
