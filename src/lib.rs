mod atr;
mod error;
mod pip;

pub mod advisor;
pub mod config;
pub mod consts;
pub mod monitor;
pub mod protect;
pub mod terminal;
pub mod types;

pub use advisor::{Advisor, Verdict, build_prompt};
pub use atr::{Atr, atr_pips};
pub use config::{Settings, load_profiles, resolve_profile};
pub use error::{Error, Result};
pub use monitor::MonitorOptions;
pub use pip::{pip_size, profit_pips};
pub use protect::{GuardMode, GuardProfile, PassSummary, StopPlan, apply, plan_stop, protect_pass};
pub use terminal::Terminal;
pub use types::{
    AccountInfo, Candle, DealRecord, Position, Side, SymbolSpec, Tick, Timeframe, TradeReply,
    TradeRequest,
};
