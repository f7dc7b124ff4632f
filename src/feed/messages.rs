// feed/messages.rs
// Wire frames for the upstream event feed. Frames are discriminated by a
// transaction-type tag; anything unrecognized becomes `Unknown` and is
// logged and dropped, never panicked on.

use chrono::{ DateTime, Utc };
use serde::Deserialize;

/// Parsed inbound frame.
#[derive(Debug, Clone)]
pub enum FeedMessage {
    NewToken(NewTokenEvent),
    Trade(TradeEvent),
    SubscriptionAck { message: String },
    Unknown(String),
}

/// Token creation or token update announcement.
#[derive(Debug, Clone)]
pub struct NewTokenEvent {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub uri: Option<String>,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub liquidity: Option<f64>,
    pub volume_24h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub volume_change_24h: Option<f64>,
    pub holders: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// A single trade frame. `side` stays a raw string here; validation is
/// the processor's job.
#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub mint: String,
    pub side: String,
    pub amount: f64,
    pub price: f64,
    pub wallet: String,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    tx_type: Option<String>,
    message: Option<String>,
    mint: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    uri: Option<String>,
    signature: Option<String>,
    trader_public_key: Option<String>,
    token_amount: Option<f64>,
    price_sol: Option<f64>,
    market_cap_sol: Option<f64>,
    volume_24h: Option<f64>,
    price_change_24h: Option<f64>,
    volume_change_24h: Option<f64>,
    holders: Option<u64>,
    v_sol_in_bonding_curve: Option<f64>,
    v_tokens_in_bonding_curve: Option<f64>,
}

impl RawFrame {
    /// Current price implied by the frame: explicit field first, curve
    /// ratio second.
    fn implied_price(&self) -> Option<f64> {
        if let Some(p) = self.price_sol {
            return Some(p);
        }
        match (self.v_sol_in_bonding_curve, self.v_tokens_in_bonding_curve) {
            (Some(sol), Some(tokens)) if tokens > 0.0 => Some(sol / tokens),
            _ => None,
        }
    }
}

/// Parse one inbound text frame.
pub fn parse_frame(text: &str) -> FeedMessage {
    let frame: RawFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(_) => return FeedMessage::Unknown(text.to_string()),
    };

    let now = Utc::now();

    match frame.tx_type.as_deref() {
        Some("create") | Some("update") => {
            let (Some(mint), Some(symbol)) = (frame.mint.clone(), frame.symbol.clone()) else {
                return FeedMessage::Unknown(text.to_string());
            };
            FeedMessage::NewToken(NewTokenEvent {
                name: frame.name.clone().unwrap_or_else(|| symbol.clone()),
                price: frame.implied_price(),
                market_cap: frame.market_cap_sol,
                liquidity: frame.v_sol_in_bonding_curve,
                volume_24h: frame.volume_24h,
                price_change_24h: frame.price_change_24h,
                volume_change_24h: frame.volume_change_24h,
                holders: frame.holders,
                uri: frame.uri,
                mint,
                symbol,
                timestamp: now,
            })
        }
        Some(side @ ("buy" | "sell")) => {
            let Some(mint) = frame.mint.clone() else {
                return FeedMessage::Unknown(text.to_string());
            };
            FeedMessage::Trade(TradeEvent {
                side: side.to_string(),
                amount: frame.token_amount.unwrap_or(0.0),
                price: frame.implied_price().unwrap_or(0.0),
                wallet: frame.trader_public_key.clone().unwrap_or_default(),
                signature: frame.signature.clone().unwrap_or_default(),
                mint,
                timestamp: now,
            })
        }
        Some(_) => FeedMessage::Unknown(text.to_string()),
        None => match frame.message {
            Some(message) => FeedMessage::SubscriptionAck { message },
            None => FeedMessage::Unknown(text.to_string()),
        },
    }
}

/// Outbound subscription frames.
pub fn subscribe_new_tokens_frame() -> String {
    serde_json::json!({ "method": "subscribeNewToken" }).to_string()
}

pub fn subscribe_trades_frame(mints: &[String]) -> String {
    serde_json::json!({ "method": "subscribeTokenTrade", "keys": mints }).to_string()
}

pub fn unsubscribe_trades_frame(mints: &[String]) -> String {
    serde_json::json!({ "method": "unsubscribeTokenTrade", "keys": mints }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_frame() {
        let text = r#"{
            "txType": "create",
            "mint": "MintAAA111111111111111111111pump",
            "symbol": "AAA",
            "name": "Token AAA",
            "uri": "https://meta.example/aaa.json",
            "vSolInBondingCurve": 30.0,
            "vTokensInBondingCurve": 1000000.0,
            "marketCapSol": 30.0
        }"#;

        match parse_frame(text) {
            FeedMessage::NewToken(t) => {
                assert_eq!(t.mint, "MintAAA111111111111111111111pump");
                assert_eq!(t.symbol, "AAA");
                assert_eq!(t.liquidity, Some(30.0));
                let price = t.price.expect("curve-implied price");
                assert!((price - 0.00003).abs() < 1e-12);
            }
            other => panic!("expected NewToken, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_trade_frame() {
        let text = r#"{
            "txType": "sell",
            "mint": "MintBBB",
            "signature": "sig-0123456789abcdef",
            "traderPublicKey": "wallet111",
            "tokenAmount": 5000.0,
            "priceSol": 0.0002
        }"#;

        match parse_frame(text) {
            FeedMessage::Trade(t) => {
                assert_eq!(t.side, "sell");
                assert_eq!(t.amount, 5000.0);
                assert_eq!(t.price, 0.0002);
                assert_eq!(t.wallet, "wallet111");
            }
            other => panic!("expected Trade, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_subscription_ack() {
        let text = r#"{"message": "Successfully subscribed to token creation events."}"#;
        assert!(matches!(
            parse_frame(text),
            FeedMessage::SubscriptionAck { .. }
        ));
    }

    #[test]
    fn test_unknown_frames_do_not_panic() {
        assert!(matches!(parse_frame("not json"), FeedMessage::Unknown(_)));
        assert!(matches!(
            parse_frame(r#"{"txType": "migrate", "mint": "X"}"#),
            FeedMessage::Unknown(_)
        ));
        assert!(matches!(parse_frame("{}"), FeedMessage::Unknown(_)));
        // Create frame missing its symbol is malformed, not a panic.
        assert!(matches!(
            parse_frame(r#"{"txType": "create", "mint": "X"}"#),
            FeedMessage::Unknown(_)
        ));
    }

    #[test]
    fn test_outbound_frames() {
        assert_eq!(
            subscribe_new_tokens_frame(),
            r#"{"method":"subscribeNewToken"}"#
        );
        let frame = subscribe_trades_frame(&["A".to_string(), "B".to_string()]);
        assert!(frame.contains(r#""keys":["A","B"]"#));
        let frame = unsubscribe_trades_frame(&["A".to_string()]);
        assert!(frame.contains("unsubscribeTokenTrade"));
    }
}
