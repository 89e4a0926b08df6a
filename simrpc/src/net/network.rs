use super::Config;
use crate::{client::Route, server::Server};
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
    time::Instant,
};
use tracing::*;

/// Everything guarded by the network lock.
///
/// This object manages destinations, endpoints, bindings and fault flags.
/// It doesn't perform any I/O.
pub(crate) struct State {
    pub reliable: bool,
    /// Pause a long time before failing a call with no route.
    pub long_delays: bool,
    /// Sometimes delay replies a long time.
    pub long_reordering: bool,
    servers: HashMap<String, Destination>,
    ends: HashMap<Arc<str>, End>,
    next_id: u64,
}

/// A named holder of a dispatcher.
struct Destination {
    /// Distinguishes a destination from an earlier one with the same name.
    id: u64,
    server: Server,
    /// Cleared by a sweep unless refreshed by a heartbeat since the last sweep.
    enabled: bool,
    refreshed: bool,
    last_active: Instant,
    /// Advertised `(service, method)` pairs.
    services: Vec<(String, String)>,
}

#[derive(Default)]
struct End {
    enabled: bool,
    server: Option<String>,
}

/// A snapshot of an endpoint's routing info.
#[derive(Debug)]
pub(crate) struct EndInfo {
    pub enabled: bool,
    pub server_name: Option<String>,
    /// The resolved destination, if it exists and is enabled.
    pub dest: Option<(u64, Server)>,
    pub reliable: bool,
    pub long_delays: bool,
    pub long_reordering: bool,
}

impl State {
    pub fn new(config: &Config) -> Self {
        State {
            reliable: config.reliable,
            long_delays: config.long_delays,
            long_reordering: config.long_reordering,
            servers: HashMap::new(),
            ends: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn add_server(&mut self, name: String, server: Server) -> bool {
        match self.servers.entry(name) {
            Entry::Occupied(e) => {
                debug!(server = %e.key(), "add server: already exists");
                false
            }
            Entry::Vacant(e) => {
                debug!(server = %e.key(), "add server");
                self.next_id += 1;
                let services = server.routes();
                e.insert(Destination {
                    id: self.next_id,
                    server,
                    enabled: true,
                    refreshed: true,
                    last_active: Instant::now(),
                    services,
                });
                true
            }
        }
    }

    pub fn delete_server(&mut self, name: &str) -> bool {
        let removed = self.servers.remove(name).is_some();
        debug!(server = name, removed, "delete server");
        removed
    }

    pub fn add_service(&mut self, server: &str, service: &str, method: &str) {
        let Some(dest) = self.servers.get_mut(server) else {
            debug!(server, "add service: no such server");
            return;
        };
        if dest.services.iter().any(|(s, m)| s == service && m == method) {
            return;
        }
        debug!(server, service, method, "add service");
        dest.services.push((service.to_owned(), method.to_owned()));
    }

    pub fn delete_service(&mut self, server: &str, service: &str, method: &str) {
        let Some(dest) = self.servers.get_mut(server) else {
            return;
        };
        dest.services.retain(|(s, m)| !(s == service && m == method));
        debug!(server, service, method, "delete service");
    }

    /// Advertised routes of every enabled destination, sorted.
    pub fn routes(&self) -> Vec<Route> {
        let mut routes: Vec<_> = self
            .servers
            .iter()
            .filter(|(_, dest)| dest.enabled)
            .flat_map(|(name, dest)| {
                dest.services
                    .iter()
                    .map(move |(service, method)| Route::new(name.as_str(), service, method))
            })
            .collect();
        routes.sort_unstable_by(|a, b| {
            (&a.server, &a.service, &a.method).cmp(&(&b.server, &b.service, &b.method))
        });
        routes
    }

    pub fn heartbeat(&mut self, server: &str) {
        let Some(dest) = self.servers.get_mut(server) else {
            debug!(server, "heartbeat: no such server");
            return;
        };
        if !dest.enabled {
            debug!(server, "re-enabled by heartbeat");
        }
        dest.last_active = Instant::now();
        dest.enabled = true;
        dest.refreshed = true;
    }

    /// Disable every destination that missed its heartbeat since the last sweep.
    pub fn sweep(&mut self) {
        for (name, dest) in &mut self.servers {
            if !dest.refreshed && dest.enabled {
                debug!(server = %name, "registration expired");
                dest.enabled = false;
            }
            dest.refreshed = false;
        }
    }

    pub fn server_enabled(&self, server: &str) -> Option<bool> {
        self.servers.get(server).map(|dest| dest.enabled)
    }

    pub fn last_active(&self, server: &str) -> Option<Instant> {
        self.servers.get(server).map(|dest| dest.last_active)
    }

    pub fn count(&self, server: &str) -> Option<u64> {
        self.servers.get(server).map(|dest| dest.server.count())
    }

    pub fn insert_end(&mut self, name: Arc<str>) {
        debug!(endname = %name, "insert end");
        // the key is the owner's name, so a stale owner can't remove it
        if self.ends.remove(&*name).is_some() {
            warn!(endname = %name, "end name reused; previous binding dropped");
        }
        self.ends.insert(name, End::default());
    }

    /// Forget the end created with `name`, unless the name was reused since.
    pub fn remove_end(&mut self, name: &Arc<str>) {
        match self.ends.get_key_value(&**name) {
            Some((key, _)) if Arc::ptr_eq(key, name) => {
                debug!(endname = %name, "remove end");
                self.ends.remove(&**name);
            }
            _ => {}
        }
    }

    pub fn connect(&mut self, endname: &str, server: &str) {
        let end = self.end_mut(endname);
        if let Some(old) = end.server.replace(server.to_owned()) {
            if old != server {
                debug!(endname, from = %old, to = server, "rebind");
                return;
            }
        }
        debug!(endname, server, "connect");
    }

    /// Bind the end to `server` only if it is not bound yet.
    pub fn connect_once(&mut self, endname: &str, server: &str) -> bool {
        let end = self.end_mut(endname);
        if end.server.is_some() {
            return false;
        }
        end.server = Some(server.to_owned());
        debug!(endname, server, "connect");
        true
    }

    pub fn enable(&mut self, endname: &str, enabled: bool) {
        debug!(
            endname,
            "end is {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.end_mut(endname).enabled = enabled;
    }

    fn end_mut(&mut self, endname: &str) -> &mut End {
        self.ends.entry(endname.into()).or_default()
    }

    pub fn end_info(&self, endname: &str) -> EndInfo {
        let end = self.ends.get(endname);
        let server_name = end.and_then(|end| end.server.clone());
        let dest = server_name
            .as_ref()
            .and_then(|name| self.servers.get(name))
            .filter(|dest| dest.enabled)
            .map(|dest| (dest.id, dest.server.clone()));
        EndInfo {
            enabled: end.map_or(false, |end| end.enabled),
            server_name,
            dest,
            reliable: self.reliable,
            long_delays: self.long_delays,
            long_reordering: self.long_reordering,
        }
    }

    /// Whether a call from `endname` to destination `id` can no longer be answered.
    ///
    /// Compares the destination by identity, so a server deleted and added
    /// again under the same name counts as dead.
    pub fn is_server_dead(&self, endname: &str, server_name: &str, id: u64) -> bool {
        let Some(end) = self.ends.get(endname) else {
            return true;
        };
        !end.enabled
            || end.server.as_deref() != Some(server_name)
            || self.servers.get(server_name).map_or(true, |dest| dest.id != id)
    }

    pub fn num_servers(&self) -> usize {
        self.servers.len()
    }

    pub fn num_ends(&self) -> usize {
        self.ends.len()
    }
}
