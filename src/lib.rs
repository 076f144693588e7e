pub mod application;
pub mod config;
pub mod directory;
pub mod error;
pub mod hierarchy;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod logging;
pub mod notify;
pub mod payout;
pub mod period;
pub mod service;
pub mod store;
pub mod target;
pub mod timestamp;
pub mod user;
pub mod utils;

pub use error::{CoreError, CoreResult, StoreError, ValidationError};
pub use service::Backoffice;
