pub mod config;
pub mod store_url;
pub mod types;

pub use config::GatewayConfig;
pub use store_url::StoreUrl;
pub use types::*;
