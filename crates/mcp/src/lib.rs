pub mod http;
pub mod server;
pub mod stdio;
pub mod transport;

pub use server::McpServer;
