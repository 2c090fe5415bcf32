pub mod server;
pub mod tools;

pub use server::{serve_stdio, McpServeError, NaoMcpServer};
pub use tools::{NaoTools, ToolReply};
