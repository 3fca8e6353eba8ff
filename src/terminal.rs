//! Client for the MT5 bridge EA: newline-delimited JSON request/response
//! over TCP, one request in flight at a time.

use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use crate::config::Settings;
use crate::consts::{REQUEST_TIMEOUT_SECS, TRADE_RETCODE_DONE};
use crate::error::{Error, Result};
use crate::types::{
    AccountInfo, Candle, DealRecord, Position, SymbolSpec, Tick, Timeframe, TradeReply,
    TradeRequest,
};

pub struct Terminal {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

#[derive(Deserialize)]
struct Envelope {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<BridgeFault>,
}

#[derive(Deserialize)]
struct BridgeFault {
    #[serde(default)]
    code: i64,
    message: String,
}

impl Terminal {
    /// Open the TCP session and log in to the trade account behind the
    /// bridge. Every later call is a single blocking round-trip.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let addr = format!("{}:{}", settings.bridge_host, settings.bridge_port);
        info!("Connecting to MT5 bridge at {}", addr);

        let stream = timeout(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| Error::Timeout(REQUEST_TIMEOUT_SECS))??;

        let (read_half, write_half) = stream.into_split();
        let mut terminal = Terminal {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_id: 0,
        };

        let account: AccountInfo = terminal
            .call(
                "login",
                json!({
                    "login": settings.login,
                    "password": settings.password,
                    "server": settings.server,
                }),
            )
            .await?;
        info!(
            "Logged in to {} as {} ({})",
            account.server, account.login, account.currency
        );

        Ok(terminal)
    }

    async fn call<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> Result<T> {
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&json!({
            "id": id,
            "method": method,
            "params": params,
        }))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        let mut reply = String::new();
        let n = timeout(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.reader.read_line(&mut reply),
        )
        .await
        .map_err(|_| Error::Timeout(REQUEST_TIMEOUT_SECS))??;
        if n == 0 {
            return Err(Error::Protocol("bridge closed the connection".to_string()));
        }

        let envelope: Envelope = serde_json::from_str(reply.trim_end())?;
        if envelope.id != id {
            return Err(Error::Protocol(format!(
                "reply id {} does not match request id {} ({})",
                envelope.id, id, method
            )));
        }
        if let Some(fault) = envelope.error {
            return Err(Error::Bridge(format!(
                "{} (code {})",
                fault.message, fault.code
            )));
        }

        //a missing or null result is still a valid reply for Option targets
        let result = envelope.result.unwrap_or(Value::Null);
        Ok(serde_json::from_value(result)?)
    }

    pub async fn account_info(&mut self) -> Result<AccountInfo> {
        self.call("account_info", Value::Null).await
    }

    /// Snapshot of all open positions.
    pub async fn positions(&mut self) -> Result<Vec<Position>> {
        self.call("positions_get", Value::Null).await
    }

    /// Latest tick, or `Error::NoTick` when the market is not quoting.
    pub async fn tick(&mut self, symbol: &str) -> Result<Tick> {
        let tick: Option<Tick> = self
            .call("symbol_info_tick", json!({ "symbol": symbol }))
            .await?;
        tick.ok_or_else(|| Error::NoTick(symbol.to_string()))
    }

    pub async fn symbol_info(&mut self, symbol: &str) -> Result<SymbolSpec> {
        let spec: Option<SymbolSpec> =
            self.call("symbol_info", json!({ "symbol": symbol })).await?;
        spec.ok_or_else(|| Error::UnknownSymbol(symbol.to_string()))
    }

    /// Recent OHLC bars, oldest first.
    pub async fn candles(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        count: u32,
    ) -> Result<Vec<Candle>> {
        self.call(
            "copy_rates",
            json!({
                "symbol": symbol,
                "timeframe": timeframe.as_str(),
                "count": count,
            }),
        )
        .await
    }

    /// Send one mutation to the trade server. Anything but
    /// TRADE_RETCODE_DONE comes back as `Error::Rejected`.
    pub async fn order_send(&mut self, request: &TradeRequest) -> Result<TradeReply> {
        let reply: TradeReply = self
            .call("order_send", serde_json::to_value(request)?)
            .await?;
        if reply.retcode != TRADE_RETCODE_DONE {
            return Err(Error::Rejected {
                code: reply.retcode,
                comment: reply.comment,
            });
        }
        Ok(reply)
    }

    /// Closed deals from the last `days` days, oldest first.
    pub async fn history_deals(&mut self, days: u32) -> Result<Vec<DealRecord>> {
        self.call("history_deals_get", json!({ "days": days })).await
    }

    /// Best-effort goodbye; the connection drops either way.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.call::<Option<bool>>("shutdown", Value::Null).await {
            debug!("bridge shutdown request failed: {}", e);
        }
    }
}
