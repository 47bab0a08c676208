//! Remote-control relay for a browser video player.
//!
//! A client sends short JSON commands (`play`, `next`, `open <url>`, ...)
//! over a persistent connection; the server turns each one into a keystroke
//! or URL-open against the local browser.
//!
//! - [`command`] defines the wire schema, server replies, and line framing.
//! - [`automation`] hides the platform mechanism behind
//!   [`automation::AutomationBackend`].
//! - [`executor`] maps commands onto automation calls.
//! - [`handler`] runs the per-connection decode, execute, reply loop.
//! - [`server`] accepts raw TCP or WebSocket connections and spawns handlers.
//! - [`client`] reads operator input and forwards it.
//! - [`cli`] parses the command line for both modes.

pub mod automation;
pub mod cli;
pub mod client;
pub mod command;
pub mod error;
pub mod executor;
pub mod handler;
pub mod server;
mod shutdown;
