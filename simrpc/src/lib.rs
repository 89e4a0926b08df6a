//! Reflective RPC dispatch over a fault-injecting simulated network.
//!
//! - A [`ServiceTable`] maps method names of one object to invocable
//!   descriptors. Build it with [`#[service]`](macro@service) and [`register`], or
//!   by hand with [`ServiceTable::builder`].
//! - A [`Server`] routes `"Service.Method"` calls to its service tables.
//! - The [`Network`] carries calls from [`ClientEnd`]s to servers, and can
//!   drop, delay and reorder them.
//!
//! ```
//! struct Arith;
//!
//! #[simrpc::service]
//! impl Arith {
//!     #[rpc(name = "Multiply")]
//!     pub fn multiply(&self, (a, b): (i64, i64), reply: &mut i64) {
//!         *reply = a * b;
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let server = simrpc::Server::new();
//! server.add_service(simrpc::register(Arith));
//!
//! let net = simrpc::Network::new();
//! net.add_server("arith", server);
//! let end = net.create_client("client");
//! net.connect("client", "arith");
//! net.enable("client", true);
//!
//! let mut product = 0i64;
//! assert!(end.call("Arith.Multiply", &(6i64, 7i64), &mut product).await);
//! assert_eq!(product, 42);
//! # }
//! ```

#![warn(missing_docs)]

// lets `#[service]` refer to `::simrpc` inside this crate
extern crate self as simrpc;

mod client;
pub mod codec;
mod error;
mod message;
pub mod net;
pub mod rand;
mod server;
mod service;

#[cfg(feature = "macros")]
pub use simrpc_macros::service;

pub use self::client::{
    ClientEnd, FirstMatch, RoundRobin, Route, Selector, ServerEntry, ServiceEntry, Topology,
    TopologyConfig,
};
pub use self::error::{Error, Result};
pub use self::message::{split_svc_meth, ReplyMsg, Request};
pub use self::net::{Config, Network, Stat};
pub use self::server::Server;
pub use self::service::{register, Message, MethodDesc, Service, ServiceBuilder, ServiceTable};

/// Initialize a global logger from the `RUST_LOG` environment variable.
///
/// Calling it more than once has no effect.
pub fn init_logger() {
    use std::sync::Once;
    static LOGGER_INIT: Once = Once::new();
    LOGGER_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::from_default_env();
        // a test harness may have installed one already
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
