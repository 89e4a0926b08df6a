//! A fault-injecting network connecting call endpoints to servers.
//!
//! # Examples
//!
//! ```
//! use simrpc::{net::Network, Server, ServiceTable};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let server = Server::new();
//! server.add_service(
//!     ServiceTable::builder("Arith")
//!         .method("Multiply", |(a, b): (i64, i64), reply: &mut i64| *reply = a * b)
//!         .build(),
//! );
//!
//! let net = Network::new();
//! net.add_server("server", server);
//! let end = net.create_client("client");
//! net.connect("client", "server");
//! net.enable("client", true);
//!
//! let mut reply = 0i64;
//! assert!(end.call("Arith.Multiply", &(6i64, 7i64), &mut reply).await);
//! assert_eq!(reply, 42);
//! assert_eq!(net.count("server"), Some(1));
//! # }
//! ```

use crate::{
    client::{ClientEnd, FirstMatch, Route, Selector, Topology},
    message::ReqMsg,
    rand::GlobalRng,
    server::Server,
};
use spin::Mutex;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::*;

mod config;
mod network;
mod process;

pub use self::config::Config;
use self::network::State;

/// The simulated network.
///
/// Cloning is cheap and clones refer to the same network.
#[derive(Clone)]
pub struct Network {
    core: Arc<Core>,
}

struct Core {
    state: Mutex<State>,
    config: Config,
    rand: GlobalRng,
    total_count: AtomicU64,
    total_bytes: AtomicU64,
    intake: mpsc::Sender<ReqMsg>,
    /// Fired by [`Network::shutdown`].
    done: CancellationToken,
}

/// Network statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Number of registered servers.
    pub servers: usize,
    /// Number of known endpoints.
    pub ends: usize,
    /// Requests taken off the intake queue.
    pub total_count: u64,
    /// Bytes of delivered arguments and replies.
    pub total_bytes: u64,
}

impl Network {
    /// Create a network with the default configuration and start it.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a network with the given configuration and start it.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn with_config(config: Config) -> Self {
        let (net, incoming) = Self::create(config);
        net.start(incoming);
        net
    }

    fn create(config: Config) -> (Self, mpsc::Receiver<ReqMsg>) {
        let rand = match config.seed {
            Some(seed) => GlobalRng::new_with_seed(seed),
            None => GlobalRng::new(),
        };
        debug!(seed = rand.seed(), "create network");
        let (intake, incoming) = mpsc::channel(config.intake_capacity.max(1));
        let core = Core {
            state: Mutex::new(State::new(&config)),
            config,
            rand,
            total_count: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            intake,
            done: CancellationToken::new(),
        };
        let net = Network {
            core: Arc::new(core),
        };
        (net, incoming)
    }

    fn start(&self, mut incoming: mpsc::Receiver<ReqMsg>) {
        // the tasks must not keep the network alive
        let core = Arc::downgrade(&self.core);
        let done = self.core.done.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = done.cancelled() => break,
                    msg = incoming.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                let Some(core) = core.upgrade() else {
                    break;
                };
                core.total_count.fetch_add(1, Ordering::Relaxed);
                core.total_bytes
                    .fetch_add(msg.request.args.len() as u64, Ordering::Relaxed);
                let net = Network { core };
                tokio::spawn(net.process_req(msg));
            }
            debug!("intake closed");
        });

        let Some(interval) = self.core.config.sweep_interval else {
            return;
        };
        if interval.is_zero() {
            warn!("sweep interval is zero, liveness sweep disabled");
            return;
        }
        let core = Arc::downgrade(&self.core);
        let done = self.core.done.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = done.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(core) = core.upgrade() else {
                    break;
                };
                core.state.lock().sweep();
            }
            debug!("sweep stopped");
        });
    }

    /// Stop the network.
    ///
    /// Requests that are not yet taken off the intake queue fail, and new
    /// calls fail immediately. Calls already being processed run to the end.
    pub fn shutdown(&self) {
        if !self.core.done.is_cancelled() {
            debug!("shutdown network");
        }
        self.core.done.cancel();
    }

    /// Returns whether [`shutdown`](Network::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.core.done.is_cancelled()
    }

    /// The configuration this network was created with.
    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Get the statistics.
    pub fn stat(&self) -> Stat {
        let state = self.core.state.lock();
        Stat {
            servers: state.num_servers(),
            ends: state.num_ends(),
            total_count: self.total_count(),
            total_bytes: self.total_bytes(),
        }
    }

    /// Register a server under `name`.
    ///
    /// The server's services are advertised in the registry. Does nothing if
    /// a server with the same name already exists.
    pub fn add_server(&self, name: impl Into<String>, server: Server) {
        self.core.state.lock().add_server(name.into(), server);
    }

    /// Remove a server. Calls in flight to it fail.
    pub fn delete_server(&self, name: &str) {
        self.core.state.lock().delete_server(name);
    }

    /// Advertise `service.method` on a server.
    pub fn add_service(&self, server: &str, service: &str, method: &str) {
        self.core
            .state
            .lock()
            .add_service(server, service, method);
    }

    /// Withdraw `service.method` from a server.
    pub fn delete_service(&self, server: &str, service: &str, method: &str) {
        self.core
            .state
            .lock()
            .delete_service(server, service, method);
    }

    /// Advertise every enabled route of a topology on the servers that exist.
    pub fn add_topology(&self, topology: &Topology) {
        let mut state = self.core.state.lock();
        for route in topology.routes.iter().filter(|route| route.enabled) {
            state.add_service(&route.server, &route.service, &route.method);
        }
    }

    /// Advertised routes of all enabled servers.
    pub fn routes(&self) -> Vec<Route> {
        self.core.state.lock().routes()
    }

    /// Mark a server as alive.
    pub fn heartbeat(&self, server: &str) {
        self.core.state.lock().heartbeat(server);
    }

    /// Disable every server that didn't send a heartbeat since the last sweep.
    pub fn sweep(&self) {
        self.core.state.lock().sweep();
    }

    /// Returns whether a server is enabled, or `None` if it doesn't exist.
    pub fn server_enabled(&self, server: &str) -> Option<bool> {
        self.core.state.lock().server_enabled(server)
    }

    /// Time of the last heartbeat of a server.
    pub fn last_active(&self, server: &str) -> Option<Instant> {
        self.core.state.lock().last_active(server)
    }

    /// Create a client end bound by [`connect`](Network::connect).
    ///
    /// The end starts disabled.
    pub fn create_client(&self, name: impl Into<String>) -> ClientEnd {
        let name: Arc<str> = name.into().into();
        self.core.state.lock().insert_end(name.clone());
        ClientEnd::new(name, self.clone(), None, Box::new(FirstMatch))
    }

    /// Create a client end that picks its server from `topology`.
    ///
    /// The end starts disabled.
    pub fn create_client_with_topology(
        &self,
        name: impl Into<String>,
        topology: Topology,
        selector: impl Selector,
    ) -> ClientEnd {
        let name: Arc<str> = name.into().into();
        self.core.state.lock().insert_end(name.clone());
        ClientEnd::new(name, self.clone(), Some(topology), Box::new(selector))
    }

    pub(crate) fn remove_end(&self, name: &Arc<str>) {
        self.core.state.lock().remove_end(name);
    }

    /// Bind an end to a server, replacing any previous binding.
    pub fn connect(&self, endname: &str, server: &str) {
        self.core.state.lock().connect(endname, server);
    }

    /// Bind an end to a server unless it is already bound.
    pub(crate) fn connect_once(&self, endname: &str, server: &str) -> bool {
        self.core.state.lock().connect_once(endname, server)
    }

    /// Enable or disable an end.
    pub fn enable(&self, endname: &str, enabled: bool) {
        self.core.state.lock().enable(endname, enabled);
    }

    /// Set whether the network is reliable.
    pub fn set_reliable(&self, yes: bool) {
        debug!(reliable = yes);
        self.core.state.lock().reliable = yes;
    }

    /// Set whether calls with no route fail after a long delay.
    pub fn set_long_delays(&self, yes: bool) {
        debug!(long_delays = yes);
        self.core.state.lock().long_delays = yes;
    }

    /// Set whether replies are sometimes delayed a long time.
    pub fn set_long_reordering(&self, yes: bool) {
        debug!(long_reordering = yes);
        self.core.state.lock().long_reordering = yes;
    }

    /// Number of calls dispatched by a server.
    pub fn count(&self, server: &str) -> Option<u64> {
        self.core.state.lock().count(server)
    }

    /// Number of requests taken off the intake queue.
    pub fn total_count(&self) -> u64 {
        self.core.total_count.load(Ordering::Relaxed)
    }

    /// Bytes of arguments and delivered replies.
    pub fn total_bytes(&self) -> u64 {
        self.core.total_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn intake(&self) -> &mpsc::Sender<ReqMsg> {
        &self.core.intake
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("stat", &self.stat())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceTable;
    use std::time::Duration;

    fn echo() -> Server {
        let server = Server::new();
        server.add_service(
            ServiceTable::builder("Echo")
                .method("Echo", |s: String, reply: &mut String| *reply = s)
                .build(),
        );
        server
    }

    #[tokio::test]
    async fn counters() {
        crate::init_logger();
        let net = Network::new();
        net.add_server("s", echo());
        let end = net.create_client("c");
        net.connect("c", "s");
        net.enable("c", true);

        let mut reply = String::new();
        assert!(end.call("Echo.Echo", &"hello".to_string(), &mut reply).await);
        assert_eq!(reply, "hello");

        let stat = net.stat();
        assert_eq!(stat.servers, 1);
        assert_eq!(stat.ends, 1);
        assert_eq!(stat.total_count, 1);
        // length prefix plus content, both ways
        assert_eq!(stat.total_bytes, 2 * (8 + 5));
        assert_eq!(net.count("s"), Some(1));
        assert_eq!(net.count("nope"), None);
    }

    #[tokio::test]
    async fn registry() {
        let net = Network::new();
        net.add_server("s", echo());
        assert_eq!(net.routes(), vec![Route::new("s", "Echo", "Echo")]);
        net.add_service("s", "Kv", "Get");
        net.delete_service("s", "Echo", "Echo");
        assert_eq!(net.routes(), vec![Route::new("s", "Kv", "Get")]);

        net.sweep();
        net.sweep();
        assert_eq!(net.server_enabled("s"), Some(false));
        assert!(net.routes().is_empty());
        let before = net.last_active("s").unwrap();
        net.heartbeat("s");
        assert_eq!(net.server_enabled("s"), Some(true));
        assert!(net.last_active("s").unwrap() >= before);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sweep() {
        let net = Network::with_config(Config {
            sweep_interval: Some(Duration::from_secs(1)),
            ..Config::default()
        });
        net.add_server("s", echo());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(net.server_enabled("s"), Some(true));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(net.server_enabled("s"), Some(false));

        net.shutdown();
        net.heartbeat("s");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(net.server_enabled("s"), Some(true));
    }
}
