pub mod auth;
pub mod conversation;
pub mod error;
pub mod history;
pub mod router;
pub mod server;
pub mod state;

pub use server::GatewayServer;
