pub mod dto;
mod identity;
mod permissions;
pub mod response;
mod router;

pub use router::{AppState, create_router};
