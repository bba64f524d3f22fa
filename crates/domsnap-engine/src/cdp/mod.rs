//! Chrome DevTools Protocol client.
//!
//! Connects to Chromium over WebSocket and speaks the CDP JSON-RPC protocol.
//! Start the browser with remote debugging first:
//!
//! ```bash
//! chrome --remote-debugging-port=9222
//! ```
//!
//! ```rust,ignore
//! let client = CdpClient::connect("http://localhost:9222").await?;
//! let page = client.attach_first_page().await?;
//! page.navigate("https://example.com").await?;
//! ```

mod client;
mod error;
mod protocol;
mod session;

pub use client::CdpClient;
pub use error::CdpError;
pub use protocol::*;
pub use session::{PageSession, OBJECT_GROUP};
