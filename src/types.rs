use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Not;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl Not for Side {
    type Output = Side;

    fn not(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One broker-reported open trade. Owned by the terminal, we only read
/// snapshots and send single modify/close requests back.
#[derive(Debug, Clone, Deserialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price_open: f64,
    pub price_current: f64,
    //0.0 means unset on both stops
    #[serde(default)]
    pub sl: f64,
    #[serde(default)]
    pub tp: f64,
    pub profit: f64,
    #[serde(default)]
    pub magic: u64,
    #[serde(default)]
    pub time: i64,
}

impl Position {
    pub fn has_sl(&self) -> bool {
        self.sl != 0.0
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Tick {
    #[serde(default)]
    pub time: i64,
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    /// Price a position of the given side would close at right now.
    pub fn close_price(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SymbolSpec {
    pub digits: u32,
    pub point: f64,
    //min stop distance from price, in points
    #[serde(default)]
    pub stops_level: u32,
    #[serde(default = "default_true")]
    pub trade_allowed: bool,
}

impl SymbolSpec {
    pub fn round_price(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.digits as i32);
        (price * factor).round() / factor
    }

    pub fn min_stop_distance(&self) -> f64 {
        self.stops_level as f64 * self.point
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Candle {
    #[serde(default)]
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub tick_volume: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    pub server: String,
    pub currency: String,
    pub balance: f64,
    pub equity: f64,
    pub margin_free: f64,
    #[serde(default)]
    pub profit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DealRecord {
    pub ticket: u64,
    #[serde(default)]
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub profit: f64,
    #[serde(default)]
    pub time: i64,
}

/// The single mutating call: modify stops on an open position, or deal at
/// market (open, or close when `position` carries the ticket to offset).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TradeRequest {
    Sltp {
        ticket: u64,
        symbol: String,
        sl: f64,
        tp: f64,
    },
    Deal {
        symbol: String,
        side: Side,
        volume: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<u64>,
        sl: f64,
        tp: f64,
        deviation: u32,
        magic: u64,
        comment: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeReply {
    pub retcode: u32,
    #[serde(default)]
    pub order: u64,
    #[serde(default)]
    pub deal: u64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
            Timeframe::MN1 => "MN1",
        }
    }

    pub fn to_secs(&self) -> u64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
            Timeframe::W1 => 7 * 24 * 60 * 60,
            Timeframe::MN1 => 30 * 24 * 60 * 60, // approximate month as 30 days
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            "W1" => Ok(Timeframe::W1),
            "MN1" => Ok(Timeframe::MN1),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(!Side::Buy, Side::Sell);
        assert_eq!(!Side::Sell, Side::Buy);
    }

    #[test]
    fn test_position_from_bridge_json() {
        let raw = r#"{
            "ticket": 123456,
            "symbol": "EURUSD",
            "side": "BUY",
            "volume": 0.10,
            "price_open": 1.10000,
            "price_current": 1.10250,
            "sl": 0.0,
            "tp": 1.11000,
            "profit": 25.0,
            "magic": 861001,
            "time": 1717000000
        }"#;
        let position: Position = serde_json::from_str(raw).unwrap();
        assert_eq!(position.ticket, 123456);
        assert_eq!(position.side, Side::Buy);
        assert!(!position.has_sl());
        assert!(position.tp > 0.0);
    }

    #[test]
    fn test_sltp_request_wire_shape() {
        let request = TradeRequest::Sltp {
            ticket: 42,
            symbol: "USDJPY".to_string(),
            sl: 154.20,
            tp: 0.0,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["action"], "sltp");
        assert_eq!(value["ticket"], 42);
        assert_eq!(value["symbol"], "USDJPY");
    }

    #[test]
    fn test_deal_request_omits_missing_position() {
        let request = TradeRequest::Deal {
            symbol: "EURUSD".to_string(),
            side: Side::Sell,
            volume: 0.01,
            position: None,
            sl: 0.0,
            tp: 0.0,
            deviation: 20,
            magic: 861_001,
            comment: "advisor".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["action"], "deal");
        assert_eq!(value["side"], "SELL");
        assert!(value.get("position").is_none());
    }

    #[test]
    fn test_tick_close_price_by_side() {
        let tick = Tick {
            time: 0,
            bid: 1.1000,
            ask: 1.1002,
        };
        assert_eq!(tick.close_price(Side::Buy), 1.1000);
        assert_eq!(tick.close_price(Side::Sell), 1.1002);
    }

    #[test]
    fn test_round_price_uses_symbol_digits() {
        let spec = SymbolSpec {
            digits: 5,
            point: 0.00001,
            stops_level: 10,
            trade_allowed: true,
        };
        assert_eq!(spec.round_price(1.100004999), 1.10000);
        assert!((spec.min_stop_distance() - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn test_timeframe_round_trip() {
        assert_eq!("m15".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!(Timeframe::H4.as_str(), "H4");
        assert_eq!(Timeframe::M5.to_secs(), 300);
        assert!("M2".parse::<Timeframe>().is_err());
    }
}
