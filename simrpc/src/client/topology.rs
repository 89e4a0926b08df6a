//! Topology documents.
//!
//! A topology lists servers and the methods they answer:
//!
//! ```json
//! {
//!   "name": "kv",
//!   "version": "1",
//!   "servers": [
//!     {
//!       "name": "kv0",
//!       "ip": "10.0.0.1",
//!       "port": 8080,
//!       "services": [
//!         { "service": "Kv", "method": "Get" },
//!         { "service": "Kv", "method": "Put", "enabled": false }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

/// A parsed topology document.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Name of the configuration.
    #[serde(default)]
    pub name: String,
    /// Version of the configuration.
    #[serde(default)]
    pub version: String,
    /// Servers.
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

/// A server in a topology document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Name the server is registered under in the network.
    pub name: String,
    /// IP address.
    #[serde(default)]
    pub ip: String,
    /// Port.
    #[serde(default)]
    pub port: u16,
    /// Methods the server answers.
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

/// A method answered by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Service name.
    pub service: String,
    /// Method name.
    pub method: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Whether clients may pick this entry.
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

impl TopologyConfig {
    /// Read a topology from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        std::fs::read_to_string(path)?.parse()
    }

    /// Print the topology as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the topology to a JSON file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl FromStr for TopologyConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// A flat list of routes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Routes in document order.
    pub routes: Vec<Route>,
}

/// A method of a service on a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Server name.
    pub server: String,
    /// Service name.
    pub service: String,
    /// Method name.
    pub method: String,
    /// `ip:port` of the server, if known.
    pub addr: Option<String>,
    /// Whether the route may be picked.
    pub enabled: bool,
}

impl Route {
    /// An enabled route without address.
    pub fn new(
        server: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Route {
            server: server.into(),
            service: service.into(),
            method: method.into(),
            addr: None,
            enabled: true,
        }
    }

    /// Returns whether this route is enabled and answers `service.method`.
    pub fn matches(&self, service: &str, method: &str) -> bool {
        self.enabled && self.service == service && self.method == method
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.service, self.method, self.server)
    }
}

impl Topology {
    /// Enabled routes answering `service.method`.
    pub fn candidates<'a>(
        &'a self,
        service: &'a str,
        method: &'a str,
    ) -> impl Iterator<Item = &'a Route> + 'a {
        self.routes
            .iter()
            .filter(move |route| route.matches(service, method))
    }
}

impl From<Vec<Route>> for Topology {
    fn from(routes: Vec<Route>) -> Self {
        Topology { routes }
    }
}

impl From<&TopologyConfig> for Topology {
    fn from(config: &TopologyConfig) -> Self {
        let routes = config
            .servers
            .iter()
            .flat_map(|server| {
                let addr = (!server.ip.is_empty())
                    .then(|| format!("{}:{}", server.ip, server.port));
                server.services.iter().map(move |entry| Route {
                    server: server.name.clone(),
                    service: entry.service.clone(),
                    method: entry.method.clone(),
                    addr: addr.clone(),
                    enabled: entry.enabled,
                })
            })
            .collect();
        Topology { routes }
    }
}

impl FromStr for Topology {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Topology::from(&s.parse::<TopologyConfig>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "name": "kv",
        "version": "1",
        "servers": [
            {
                "name": "kv0",
                "ip": "10.0.0.1",
                "port": 8080,
                "services": [
                    { "service": "Kv", "method": "Get", "description": "read a key" },
                    { "service": "Kv", "method": "Put", "enabled": false }
                ]
            },
            {
                "name": "kv1",
                "services": [{ "service": "Kv", "method": "Get" }]
            }
        ]
    }"#;

    #[test]
    fn parse() {
        let config: TopologyConfig = DOC.parse().unwrap();
        assert_eq!(config.name, "kv");
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].services[0].description, "read a key");
        assert!(config.servers[0].services[0].enabled);
        assert!(!config.servers[0].services[1].enabled);

        let topology = Topology::from(&config);
        assert_eq!(topology.routes.len(), 3);
        assert_eq!(topology.routes[0].addr.as_deref(), Some("10.0.0.1:8080"));
        assert_eq!(topology.routes[2].addr, None);

        let servers: Vec<_> = topology
            .candidates("Kv", "Get")
            .map(|route| route.server.as_str())
            .collect();
        assert_eq!(servers, ["kv0", "kv1"]);
        // disabled entries are never candidates
        assert_eq!(topology.candidates("Kv", "Put").count(), 0);
    }

    #[test]
    fn write_and_read_back() {
        let config: TopologyConfig = DOC.parse().unwrap();
        let file = format!("simrpc-topology-{}.json", std::process::id());
        let path = std::env::temp_dir().join(file);
        config.write(&path).unwrap();
        let read = TopologyConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(read, config);
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            "{ \"servers\": 1 }".parse::<Topology>(),
            Err(Error::Topology(_))
        ));
        assert!(matches!(
            TopologyConfig::from_file("/nonexistent/topology.json"),
            Err(Error::Io(_))
        ));
    }
}
