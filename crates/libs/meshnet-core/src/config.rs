use std::time::Duration;

use meshnet_routing::Instance;

/// Configuration for a [`crate::NetworkController`], in the same
/// `new` + `set_*` builder shape as the teacher lineage's
/// `TransportConfig` (`styrene-rns-transport::transport::config`).
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    host: Instance,
    component: String,
    http_connect_timeout: Duration,
    reverse_path_via_best_link: bool,
}

impl NetworkConfig {
    pub fn new(host: Instance) -> Self {
        Self {
            host,
            component: "meshnet".into(),
            http_connect_timeout: Duration::from_secs(5),
            reverse_path_via_best_link: false,
        }
    }

    /// Prefix used in this controller's log lines, for embedders running
    /// more than one mesh instance in a process.
    pub fn set_component(&mut self, component: impl Into<String>) {
        self.component = component.into();
    }

    pub fn set_http_connect_timeout(&mut self, timeout: Duration) {
        self.http_connect_timeout = timeout;
    }

    /// §9 open question: by default an `InternetResponse` is returned over
    /// the same device that delivered the request. Setting this `true`
    /// switches to a `best_link(originator)` lookup instead, at the cost of
    /// requiring full bidirectional reachability.
    pub fn set_reverse_path_via_best_link(&mut self, enabled: bool) {
        self.reverse_path_via_best_link = enabled;
    }

    pub fn host(&self) -> Instance {
        self.host
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn http_connect_timeout(&self) -> Duration {
        self.http_connect_timeout
    }

    pub fn reverse_path_via_best_link(&self) -> bool {
        self.reverse_path_via_best_link
    }
}
