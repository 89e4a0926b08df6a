//! Call endpoints.

use crate::{
    codec,
    message::{split_svc_meth, ReplyMsg, ReqMsg, Request},
    net::Network,
    service::Message,
    Result,
};
use spin::RwLock;
use std::{any::type_name, fmt, path::Path, sync::Arc};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::*;

mod select;
mod topology;

pub use self::select::{FirstMatch, RoundRobin, Selector};
pub use self::topology::{Route, ServerEntry, ServiceEntry, Topology, TopologyConfig};

/// The caller side of a connection.
///
/// Created by [`Network::create_client`] or
/// [`Network::create_client_with_topology`]. Clones share the same identity
/// and close state.
#[derive(Clone)]
pub struct ClientEnd {
    inner: Arc<Inner>,
}

struct Inner {
    name: Arc<str>,
    net: Network,
    closed: CancellationToken,
    /// Routes to pick a server from. `None` if the end is bound by hand.
    topology: RwLock<Option<Topology>>,
    selector: Box<dyn Selector>,
}

impl ClientEnd {
    pub(crate) fn new(
        name: Arc<str>,
        net: Network,
        topology: Option<Topology>,
        selector: Box<dyn Selector>,
    ) -> Self {
        ClientEnd {
            inner: Arc::new(Inner {
                name,
                net,
                closed: CancellationToken::new(),
                topology: RwLock::new(topology),
                selector,
            }),
        }
    }

    /// The end name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Call `svc_meth` with `args` and wait for the reply.
    ///
    /// On success the result is decoded into `reply` and `true` is returned.
    /// Returns `false` if there is no route, the request or reply was lost,
    /// the server went away, or the end is closed. `reply` is left untouched
    /// in that case.
    ///
    /// # Panics
    ///
    /// Panics if `args` can't be encoded, if the reply can't be decoded into
    /// `R`, or if the server panicked dispatching the call (for example an
    /// unknown service or method).
    pub async fn call<A: Message, R: Message>(
        &self,
        svc_meth: &str,
        args: &A,
        reply: &mut R,
    ) -> bool {
        let inner = &*self.inner;
        if self.is_closed() {
            debug!(endname = %inner.name, svc_meth, "call on a closed end");
            return false;
        }
        if !self.resolve(svc_meth) {
            return false;
        }

        let args = codec::encode(args).unwrap_or_else(|e| {
            panic!(
                "ClientEnd::call(): failed to encode {}: {e}",
                type_name::<A>()
            )
        });
        let (reply_tx, reply_rx) = oneshot::channel();
        let msg = ReqMsg {
            request: Request {
                endname: inner.name.clone(),
                svc_meth: svc_meth.to_owned(),
                args_type: type_name::<A>(),
                args,
            },
            reply_tx,
        };

        if inner.net.is_shutdown() {
            return false;
        }
        tokio::select! {
            biased;
            _ = inner.closed.cancelled() => {
                debug!(endname = %inner.name, svc_meth, "closed before submitting");
                return false;
            }
            res = inner.net.intake().send(msg) => {
                if res.is_err() {
                    return false;
                }
            }
        }

        let ReplyMsg { ok, reply: bytes } = match reply_rx.await {
            Ok(rep) => rep,
            // queued requests are dropped on shutdown
            Err(_) if inner.net.is_shutdown() => return false,
            Err(_) => panic!("ClientEnd::call(): dispatch of {svc_meth} panicked"),
        };
        if !ok {
            return false;
        }
        *reply = codec::decode(&bytes).unwrap_or_else(|e| {
            panic!(
                "ClientEnd::call(): failed to decode reply of {svc_meth} into {}: {e}",
                type_name::<R>()
            )
        });
        true
    }

    /// Pick a server for `svc_meth` from the topology, if the end has one.
    fn resolve(&self, svc_meth: &str) -> bool {
        let inner = &*self.inner;
        let selected = {
            let topology = inner.topology.read();
            let Some(topology) = topology.as_ref() else {
                return true;
            };
            match split_svc_meth(svc_meth) {
                Ok((service, method)) => {
                    let candidates: Vec<_> = topology.candidates(service, method).collect();
                    inner
                        .selector
                        .select(&candidates)
                        .map(|route| route.server.clone())
                }
                Err(_) => None,
            }
        };
        match selected {
            Some(server) => {
                inner.net.connect_once(&inner.name, &server);
                true
            }
            None => {
                debug!(endname = %inner.name, svc_meth, "no route in topology, refreshing");
                self.refresh_topology();
                false
            }
        }
    }

    /// Replace the topology with the routes the network advertises.
    ///
    /// The end picks its server from the topology from then on.
    pub fn refresh_topology(&self) {
        let routes = self.inner.net.routes();
        trace!(endname = %self.inner.name, routes = routes.len(), "refresh topology");
        *self.inner.topology.write() = Some(Topology::from(routes));
    }

    /// Replace the topology with one parsed from a JSON document.
    pub fn load_topology(&self, text: &str) -> Result<()> {
        let topology: Topology = text.parse()?;
        *self.inner.topology.write() = Some(topology);
        Ok(())
    }

    /// Replace the topology with one read from a JSON file.
    pub fn load_topology_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let config = TopologyConfig::from_file(path)?;
        *self.inner.topology.write() = Some(Topology::from(&config));
        Ok(())
    }

    /// A copy of the current topology.
    pub fn topology(&self) -> Option<Topology> {
        self.inner.topology.read().clone()
    }

    /// Close the end. Later calls fail immediately.
    pub fn close(&self) {
        if !self.inner.closed.is_cancelled() {
            debug!(endname = %self.inner.name, "close");
        }
        self.inner.closed.cancel();
    }

    /// Returns whether [`close`](ClientEnd::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.net.remove_end(&self.name);
    }
}

impl fmt::Debug for ClientEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientEnd")
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Server, ServiceTable};

    fn kv() -> Server {
        let server = Server::new();
        server.add_service(
            ServiceTable::builder("Kv")
                .method("Get", |key: String, value: &mut String| {
                    *value = format!("value of {key}")
                })
                .build(),
        );
        server
    }

    #[tokio::test]
    async fn close_before_call() {
        let net = Network::new();
        net.add_server("kv", kv());
        let end = net.create_client("c");
        net.connect("c", "kv");
        net.enable("c", true);

        let mut reply = String::new();
        assert!(end.call("Kv.Get", &"a".to_string(), &mut reply).await);
        end.close();
        end.close();
        assert!(end.is_closed());
        assert!(!end.call("Kv.Get", &"a".to_string(), &mut reply).await);
        assert_eq!(net.total_count(), 1);
    }

    #[tokio::test]
    async fn dropped_ends_leave_the_network() {
        let net = Network::new();
        let ends: Vec<_> = (0..5).map(|i| net.create_client(format!("c{i}"))).collect();
        assert_eq!(net.stat().ends, 5);

        let clone = ends[0].clone();
        for end in ends {
            end.close();
        }
        // the clone still holds c0
        assert_eq!(net.stat().ends, 1);
        drop(clone);
        assert_eq!(net.stat().ends, 0);
    }

    #[tokio::test]
    async fn topology_binds_once() {
        let net = Network::new();
        net.add_server("kv0", kv());
        net.add_server("kv1", kv());
        let topology: Topology = vec![
            Route::new("kv1", "Kv", "Get"),
            Route::new("kv0", "Kv", "Get"),
        ]
        .into();
        let end = net.create_client_with_topology("c", topology, FirstMatch);
        net.enable("c", true);

        let mut reply = String::new();
        assert!(end.call("Kv.Get", &"k".to_string(), &mut reply).await);
        assert_eq!(reply, "value of k");
        assert_eq!(net.count("kv1"), Some(1));

        end.load_topology(
            r#"{
                "servers": [
                    { "name": "kv0", "services": [{ "service": "Kv", "method": "Get" }] }
                ]
            }"#,
        )
        .unwrap();
        assert!(end.call("Kv.Get", &"k".to_string(), &mut reply).await);
        // still bound to the first pick
        assert_eq!(net.count("kv1"), Some(2));
        assert_eq!(net.count("kv0"), Some(0));
    }

    #[tokio::test]
    async fn owned_round_robin_sticks_to_first_pick() {
        let net = Network::new();
        net.add_server("kv0", kv());
        net.add_server("kv1", kv());
        let topology: Topology = vec![
            Route::new("kv0", "Kv", "Get"),
            Route::new("kv1", "Kv", "Get"),
        ]
        .into();
        let end = net.create_client_with_topology("c", topology, RoundRobin::new());
        net.enable("c", true);

        let mut reply = String::new();
        for _ in 0..4 {
            assert!(end.call("Kv.Get", &"k".to_string(), &mut reply).await);
        }
        assert_eq!(net.count("kv0"), Some(4));
        assert_eq!(net.count("kv1"), Some(0));
    }

    #[tokio::test]
    async fn no_candidate_refreshes() {
        let net = Network::new();
        net.add_server("kv", kv());
        let end = net.create_client_with_topology("c", Topology::default(), FirstMatch);
        net.enable("c", true);

        let mut reply = String::new();
        assert!(!end.call("Kv.Get", &"k".to_string(), &mut reply).await);
        // nothing was submitted
        assert_eq!(net.total_count(), 0);
        assert_eq!(end.topology().unwrap().routes, vec![Route::new("kv", "Kv", "Get")]);

        assert!(end.call("Kv.Get", &"k".to_string(), &mut reply).await);
        assert!(!end.call("Kv", &"k".to_string(), &mut reply).await);
    }
}
