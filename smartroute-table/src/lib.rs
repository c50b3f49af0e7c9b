//! Postfix `tcp_table` front end for the router
//!
//! Postfix is pointed at this service with a map like
//! `transport_maps = tcp:127.0.0.1:10099` and asks one `get <recipient>` per
//! lookup over a persistent connection. Each answer is either the selected
//! server's transport directive or `NO RESULT`.

pub mod protocol;
mod server;
mod session;

pub use protocol::{MAX_LINE, ProtocolError, Request, Response};
pub use server::{ListenerConfig, SessionGauge, TableServer};
pub use session::Session;
