//! Connectivity tracking
//!
//! The monitor probes the application origin and reports transitions.
//! Coming back online is what triggers write replay and the delayed preload.

use std::sync::Arc;

use reqwest::Url;

use crate::net::{Network, Request};

/// Change in connectivity observed by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    WentOnline,
    WentOffline,
}

/// Tracks whether the origin is reachable
pub struct ConnectivityMonitor {
    network: Arc<dyn Network>,
    probe_url: Url,
    online: Option<bool>,
}

impl ConnectivityMonitor {
    pub fn new(network: Arc<dyn Network>, probe_url: Url) -> Self {
        Self {
            network,
            probe_url,
            online: None,
        }
    }

    /// Last observed state; `None` before the first probe
    pub fn is_online(&self) -> Option<bool> {
        self.online
    }

    /// Record an observation. The first observation is never a transition.
    pub fn observe(&mut self, online: bool) -> Transition {
        let previous = self.online.replace(online);
        match (previous, online) {
            (Some(false), true) => Transition::WentOnline,
            (Some(true), false) => Transition::WentOffline,
            _ => Transition::Unchanged,
        }
    }

    /// Probe the origin. Any response, whatever its status, counts as online.
    pub async fn probe(&mut self) -> Transition {
        let online = self
            .network
            .fetch(&Request::get(self.probe_url.clone()))
            .await
            .is_ok();
        let transition = self.observe(online);
        match transition {
            Transition::WentOnline => log::info!("Back online"),
            Transition::WentOffline => log::info!("Gone offline"),
            Transition::Unchanged => {}
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{MockNetwork, Response};

    const ORIGIN: &str = "http://localhost:8080/";

    #[test]
    fn test_first_observation_is_not_a_transition() {
        let mut monitor = ConnectivityMonitor::new(
            Arc::new(MockNetwork::new()),
            Url::parse(ORIGIN).unwrap(),
        );
        assert_eq!(monitor.is_online(), None);
        assert_eq!(monitor.observe(false), Transition::Unchanged);
        assert_eq!(monitor.observe(true), Transition::WentOnline);
        assert_eq!(monitor.observe(true), Transition::Unchanged);
        assert_eq!(monitor.observe(false), Transition::WentOffline);
    }

    #[tokio::test]
    async fn test_probe_treats_error_status_as_online() {
        let mock = MockNetwork::new().with_response(ORIGIN, Response::new(503, ""));
        mock.set_offline(true);
        let mut monitor = ConnectivityMonitor::new(Arc::new(mock.clone()), Url::parse(ORIGIN).unwrap());

        assert_eq!(monitor.probe().await, Transition::Unchanged);
        assert_eq!(monitor.is_online(), Some(false));

        mock.set_offline(false);
        assert_eq!(monitor.probe().await, Transition::WentOnline);
    }
}
