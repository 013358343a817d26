//! Install, activate and sweep of response-cache generations

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Url;
use serde::Serialize;

use super::{ResourceCategory, Router};
use crate::error::{Error, Result};
use crate::net::{Request, Response};

type PrecacheFuture<'a> = Pin<Box<dyn Future<Output = (Url, Result<Response>)> + Send + 'a>>;

/// Where the router is in its install/activate lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Result of a successful install
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub generation: String,
    pub cached: Vec<String>,
    /// The new generation activates without waiting for old clients
    pub skip_waiting: bool,
}

/// Result of an activation
#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub generation: String,
    pub deleted: Vec<String>,
    pub claimed: bool,
}

impl Router {
    /// Precache the manifest into the current generation.
    ///
    /// All-or-nothing: any network failure or non-2xx status aborts the
    /// install before anything is written.
    pub async fn install(&self) -> Result<InstallReport> {
        self.set_state(LifecycleState::Installing);
        log::info!(
            "Installing {} ({} precache entries)",
            self.cache.name(),
            self.precache.len()
        );

        match self.fetch_precache().await {
            Ok(pairs) => {
                self.cache.put_all(&pairs)?;
                self.set_state(LifecycleState::Installed);
                log::info!("Installed {}, skipping wait", self.cache.name());
                Ok(InstallReport {
                    generation: self.cache.name().to_string(),
                    cached: pairs.iter().map(|(req, _)| req.url.to_string()).collect(),
                    skip_waiting: true,
                })
            }
            Err(e) => {
                self.set_state(LifecycleState::Redundant);
                log::error!("Install of {} failed: {}", self.cache.name(), e);
                Err(e)
            }
        }
    }

    async fn fetch_precache(&self) -> Result<Vec<(Request, Response)>> {
        let mut futures: FuturesUnordered<PrecacheFuture<'_>> = self
            .precache
            .iter()
            .map(|url| {
                let url = url.clone();
                let network = &self.network;
                Box::pin(async move {
                    let result = network
                        .fetch(&Request::get(url.clone()))
                        .await
                        .map_err(Error::from);
                    (url, result)
                }) as PrecacheFuture<'_>
            })
            .collect();

        let mut pairs = Vec::with_capacity(self.precache.len());
        while let Some((url, result)) = futures.next().await {
            let response = result.map_err(|e| Error::Install(format!("{}: {}", url, e)))?;
            if !response.is_success() {
                return Err(Error::Install(format!(
                    "{} returned HTTP {}",
                    url, response.status
                )));
            }
            pairs.push((Request::get(url), response));
        }

        // Keep manifest order in the report
        pairs.sort_by_key(|(req, _)| {
            self.precache
                .iter()
                .position(|u| *u == req.url)
                .unwrap_or(usize::MAX)
        });
        Ok(pairs)
    }

    /// Delete every generation except the current one, then claim.
    pub async fn activate(&self) -> Result<ActivateReport> {
        self.set_state(LifecycleState::Activating);
        let current = self.cache.name().to_string();

        let mut deleted = Vec::new();
        for name in self.responses.keys()? {
            if name == current {
                continue;
            }
            log::info!("Deleting old cache: {}", name);
            if self.responses.delete(&name)? {
                deleted.push(name);
            }
        }

        self.set_state(LifecycleState::Activated);
        log::debug!("Activated {}, claiming clients", current);
        Ok(ActivateReport {
            generation: current,
            deleted,
            claimed: true,
        })
    }

    /// Delete entries older than their category max-age
    pub fn sweep_expired(&self) -> Result<usize> {
        self.sweep_expired_at(Utc::now())
    }

    /// Sweep relative to an explicit instant
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for entry in self.cache.entries()? {
            let path = Url::parse(&entry.url)
                .map(|u| u.path().to_string())
                .unwrap_or_default();
            let max_age = ResourceCategory::from_path(&path).max_age();
            let age = (now - entry.stored_at).to_std().unwrap_or_default();
            if age > max_age && self.cache.delete_key(&entry.key)? {
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Swept {} expired responses from {}", removed, self.cache.name());
        }
        Ok(removed)
    }
}
