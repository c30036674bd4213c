//! HTTP/WebSocket layer of the dashboard.
//!
//! Browser pages connect to `/ws`, register widgets with internal-topic
//! subscriptions and receive normalized updates as JSON frames. The
//! ingest pipeline feeds the distribution router from the broker
//! transport; `/api/archives` serves the weekly production CSVs.

pub mod archive;
pub mod client;
pub mod ingest;
pub mod protocol;
pub mod server;

pub use client::{ClientId, ClientRegistry, WsWidget};
pub use ingest::spawn_ingest;
pub use protocol::{ClientFrame, ServerFrame};
pub use server::{build_router, start, AppState, ServerHandle};
