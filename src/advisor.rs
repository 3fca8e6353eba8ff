//! Ollama-backed trade advisor: one prompt, one keyword verdict.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Candle, Tick};

const TEMPERATURE: f64 = 0.2;
const MAX_REPLY_TOKENS: u32 = 64;
const PROMPT_CANDLES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Buy,
    Sell,
    Hold,
}

impl Verdict {
    /// First BUY/SELL/HOLD keyword in the model's reply wins; anything else
    /// reads as HOLD.
    pub fn parse(text: &str) -> Verdict {
        let upper = text.to_ascii_uppercase();
        [
            (upper.find("BUY"), Verdict::Buy),
            (upper.find("SELL"), Verdict::Sell),
            (upper.find("HOLD"), Verdict::Hold),
        ]
        .into_iter()
        .filter_map(|(at, verdict)| at.map(|at| (at, verdict)))
        .min_by_key(|(at, _)| *at)
        .map(|(_, verdict)| verdict)
        .unwrap_or(Verdict::Hold)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Buy => "BUY",
            Verdict::Sell => "SELL",
            Verdict::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateReply {
    response: String,
}

pub struct Advisor {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl Advisor {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
        }
    }

    /// POST /api/generate and hand back the raw completion text.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
                num_predict: MAX_REPLY_TOKENS,
            },
        };

        let reply: GenerateReply = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("{} replied: {}", self.model, reply.response.trim());
        Ok(reply.response)
    }

    pub async fn advise(&self, prompt: &str) -> Result<(Verdict, String)> {
        let text = self.generate(prompt).await?;
        Ok((Verdict::parse(&text), text))
    }
}

/// Compact market snapshot the model gets to reason over.
pub fn build_prompt(symbol: &str, tick: &Tick, candles: &[Candle], atr: Option<f64>) -> String {
    let mut prompt = format!(
        "You are a forex trading assistant. Instrument: {}.\nBid {}, ask {}.\n",
        symbol, tick.bid, tick.ask
    );

    if !candles.is_empty() {
        let start = candles.len().saturating_sub(PROMPT_CANDLES);
        let closes: Vec<String> = candles[start..]
            .iter()
            .map(|candle| candle.close.to_string())
            .collect();
        prompt.push_str(&format!("Recent closes, oldest first: {}.\n", closes.join(", ")));
    }
    if let Some(atr) = atr {
        prompt.push_str(&format!("Current ATR: {}.\n", atr));
    }

    prompt.push_str("Answer with exactly one word: BUY, SELL or HOLD.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_keywords() {
        assert_eq!(Verdict::parse("BUY"), Verdict::Buy);
        assert_eq!(Verdict::parse("I would sell here."), Verdict::Sell);
        assert_eq!(Verdict::parse("hold for now"), Verdict::Hold);
    }

    #[test]
    fn test_verdict_first_keyword_wins() {
        assert_eq!(Verdict::parse("SELL, do not buy"), Verdict::Sell);
        assert_eq!(Verdict::parse("buy... or maybe hold"), Verdict::Buy);
    }

    #[test]
    fn test_verdict_defaults_to_hold() {
        assert_eq!(Verdict::parse(""), Verdict::Hold);
        assert_eq!(Verdict::parse("the market looks uncertain"), Verdict::Hold);
    }

    #[test]
    fn test_generate_request_wire_shape() {
        let request = GenerateRequest {
            model: "llama3",
            prompt: "hi",
            stream: false,
            options: GenerateOptions {
                temperature: 0.2,
                num_predict: 64,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "llama3");
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_predict"], 64);
    }

    #[test]
    fn test_prompt_mentions_symbol_and_asks_one_word() {
        let tick = Tick {
            time: 0,
            bid: 1.1000,
            ask: 1.1002,
        };
        let prompt = build_prompt("EURUSD", &tick, &[], None);
        assert!(prompt.contains("EURUSD"));
        assert!(prompt.contains("BUY, SELL or HOLD"));
    }
}
