//! Server-side multiplexer.

use crate::{
    message::{split_svc_meth, ReplyMsg, Request},
    service::ServiceTable,
};
use spin::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::*;

/// A dispatcher routing `"Service.Method"` calls to service tables.
///
/// Cloning is cheap and clones share state.
#[derive(Clone, Default)]
pub struct Server {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    services: HashMap<String, Arc<ServiceTable>>,
    /// Incoming RPCs.
    count: u64,
}

impl Server {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service table, replacing any table with the same name.
    pub fn add_service(&self, table: ServiceTable) {
        let mut inner = self.inner.lock();
        debug!(service = table.name(), "add service");
        inner.services.insert(table.name().to_owned(), Arc::new(table));
    }

    /// Number of calls dispatched so far.
    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }

    /// Names of registered services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names: Vec<_> = inner.services.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Every `(service, method)` pair this server answers.
    pub fn routes(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock();
        let mut routes = Vec::new();
        for (name, table) in &inner.services {
            for method in table.method_names() {
                routes.push((name.clone(), method.to_owned()));
            }
        }
        routes.sort_unstable();
        routes
    }

    /// Dispatch a call.
    ///
    /// # Panics
    ///
    /// Panics if the service or the method is unknown, or if the name has no
    /// `Service.Method` separator.
    pub fn dispatch(&self, req: &Request) -> ReplyMsg {
        let (service_name, method_name) = match split_svc_meth(&req.svc_meth) {
            Ok(names) => names,
            Err(e) => panic!("Server::dispatch(): {e}"),
        };
        let service = {
            let mut inner = self.inner.lock();
            let service = match inner.services.get(service_name) {
                Some(service) => service.clone(),
                None => {
                    let mut choices: Vec<_> = inner.services.keys().collect();
                    choices.sort_unstable();
                    panic!(
                        "Server::dispatch(): unknown service {} in {}; expecting one of {:?}",
                        service_name, req.svc_meth, choices
                    );
                }
            };
            inner.count += 1;
            service
        };
        trace!(svc_meth = %req.svc_meth, endname = %req.endname, "dispatch");
        service.dispatch(method_name, req)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Server")
            .field("services", &inner.services.keys().collect::<Vec<_>>())
            .field("count", &inner.count)
            .finish()
    }
}
