pub mod alert;
pub mod confirm;
pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod math;
pub mod pool;
pub mod position;
pub mod price;
pub mod reconcile;
pub mod reserves;
pub mod rpc;
pub mod swap;
pub mod trigger;
pub mod utils;

pub use config::{EngineConfig, TakeProfitConfig, TradingMode};
pub use errors::EngineError;
pub use events::{EventBus, LifecycleEvent};
pub use position::store::PositionStore;
pub use position::{PartialSell, PendingSell, Position, PositionStatus, TakeProfitLevel, TradeHistoryRecord};
pub use rpc::BoundedRpc;
