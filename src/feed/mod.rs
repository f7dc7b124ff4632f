/// Upstream event feed adapter.
///
/// `client` owns the websocket connection, reconnect policy, and the
/// trade subscription set. `messages` is the wire format: a closed sum
/// type discriminated by the transaction-type tag.
pub mod client;
pub mod messages;

pub use client::{ reconnect_delay, spawn_feed_client, FeedConfig, FeedHandle };
pub use messages::{ FeedMessage, NewTokenEvent, TradeEvent };
