mod secrets;
mod server;

pub use secrets::Secrets;
pub use server::{FileConfig, MAX_KEY_LIFETIME_DAYS, ServerConfig, key_lifetime_from_days};
