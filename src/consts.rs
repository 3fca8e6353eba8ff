//MT5 trade server return codes, see the terminal docs
pub const TRADE_RETCODE_REQUOTE: u32 = 10004;
pub const TRADE_RETCODE_DONE: u32 = 10009;
pub const TRADE_RETCODE_PRICE_CHANGED: u32 = 10020;
pub const TRADE_RETCODE_PRICE_OFF: u32 = 10021;
pub const TRADE_RETCODE_TOO_MANY_REQUESTS: u32 = 10024;

//retcodes worth a second attempt, everything else is final
pub const TRANSIENT_RETCODES: &[u32] = &[
    TRADE_RETCODE_REQUOTE,
    TRADE_RETCODE_PRICE_CHANGED,
    TRADE_RETCODE_PRICE_OFF,
    TRADE_RETCODE_TOO_MANY_REQUESTS,
];

pub const DEFAULT_BRIDGE_PORT: u16 = 18812;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_PAUSE_MS: u64 = 250;

//slippage allowance in points for market deals
pub const DEFAULT_DEVIATION: u32 = 20;
pub const BOT_MAGIC: u64 = 861_001;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 30;

//stop/target distances in ATRs when opening from an advisor verdict
pub const ATR_SL_FACTOR: f64 = 2.0;
pub const ATR_TP_FACTOR: f64 = 3.0;
