pub mod arguments;
pub mod config;
pub mod database;
pub mod events;
pub mod feed;
pub mod logger;
pub mod platform;
pub mod processor;
pub mod queries;
pub mod run;
pub mod tracker;
pub mod types;

pub use events::{ BusEvent, EventBus };
pub use tracker::{ Tracker, TrackerConfig, TrackerStats };
pub use types::{
    Alert, AlertSpec, CleanupEvent, CleanupMetrics, CleanupReason, Platform, PricePoint,
    TokenHealth, TokenSnapshot, Trade, TradeSide, Trend, TrendWindow,
};
