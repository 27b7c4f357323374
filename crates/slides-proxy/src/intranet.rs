//! Host remapping for campus-network playback.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use slides_models::{IntranetMapping, IntranetMappings, LoadBalanceStrategy};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::metrics;

/// How long a failed IP is skipped.
pub const QUARANTINE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Intranet,
    Internet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub mode: NetworkMode,
    pub enabled: bool,
    pub mapping_count: usize,
}

#[derive(Debug, Clone)]
struct FailedEndpoint {
    domain: String,
    ip: String,
    failed_at: Instant,
}

#[derive(Debug)]
struct MapperState {
    enabled: bool,
    mappings: IntranetMappings,
    failed: Vec<FailedEndpoint>,
}

/// A URL whose host was replaced by a mapped IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemappedUrl {
    pub url: Url,
    pub domain: String,
    pub ip: String,
}

/// Resolves upstream hostnames to campus IPs.
///
/// Rotation indexes and the quarantine list live under one mutex, so
/// concurrent requests advance a round-robin mapping one step each.
#[derive(Debug)]
pub struct IntranetMapper {
    state: Mutex<MapperState>,
}

impl IntranetMapper {
    pub fn new(enabled: bool, mappings: IntranetMappings) -> Self {
        Self {
            state: Mutex::new(MapperState {
                enabled,
                mappings,
                failed: Vec::new(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().enabled = enabled;
        info!(enabled, "Intranet mode changed");
    }

    pub fn mappings(&self) -> IntranetMappings {
        self.state.lock().unwrap().mappings.clone()
    }

    /// Replace or add mappings, keeping the rest.
    pub fn merge_mappings(&self, overrides: IntranetMappings) {
        let mut state = self.state.lock().unwrap();
        state.mappings.extend(overrides);
    }

    pub fn network_status(&self) -> NetworkStatus {
        let state = self.state.lock().unwrap();
        NetworkStatus {
            mode: if state.enabled {
                NetworkMode::Intranet
            } else {
                NetworkMode::Internet
            },
            enabled: state.enabled,
            mapping_count: state.mappings.len(),
        }
    }

    /// Pick an IP for `domain`, ignoring the enabled flag.
    pub fn resolve_ip(&self, domain: &str) -> Option<String> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let now = Instant::now();
        state
            .failed
            .retain(|f| now.duration_since(f.failed_at) < QUARANTINE);

        let mapping = state.mappings.get_mut(domain)?;
        match mapping {
            IntranetMapping::Single { ip } => Some(ip.clone()),
            IntranetMapping::LoadBalanced {
                ips,
                strategy,
                rotation_index,
            } => {
                if ips.is_empty() {
                    return None;
                }

                let quarantined: HashSet<&str> =
                    state.failed.iter().map(|f| f.ip.as_str()).collect();
                let mut live: Vec<&String> =
                    ips.iter().filter(|ip| !quarantined.contains(ip.as_str())).collect();

                if live.is_empty() {
                    warn!(domain, "Every mapped IP is quarantined, resetting");
                    state.failed.retain(|f| f.domain != domain);
                    live = ips.iter().collect();
                }

                let chosen = match strategy {
                    LoadBalanceStrategy::RoundRobin => {
                        let idx = *rotation_index % live.len();
                        *rotation_index = (idx + 1) % live.len();
                        live[idx]
                    }
                    LoadBalanceStrategy::Random => live[rand::rng().random_range(0..live.len())],
                    LoadBalanceStrategy::FirstAvailable => live[0],
                };
                Some(chosen.clone())
            }
        }
    }

    /// Rewrite the host of `url` when intranet mode is on and a mapping exists.
    pub fn rewrite_url(&self, url: &Url) -> Option<RemappedUrl> {
        if !self.is_enabled() {
            return None;
        }
        let domain = url.host_str()?.to_string();
        let ip = self.resolve_ip(&domain)?;

        let mut remapped = url.clone();
        if let Err(e) = remapped.set_host(Some(&ip)) {
            warn!(domain, ip, "Cannot remap host: {}", e);
            return None;
        }
        debug!(domain, ip, "Remapped upstream host");
        Some(RemappedUrl {
            url: remapped,
            domain,
            ip,
        })
    }

    /// Quarantine `ip` after a transport failure.
    pub fn mark_failed(&self, ip: &str, domain: &str) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        match state
            .failed
            .iter_mut()
            .find(|f| f.ip == ip && f.domain == domain)
        {
            Some(entry) => entry.failed_at = now,
            None => state.failed.push(FailedEndpoint {
                domain: domain.to_string(),
                ip: ip.to_string(),
                failed_at: now,
            }),
        }
        warn!(domain, ip, "Quarantined intranet IP");
        metrics::record_quarantine(domain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slides_models::default_intranet_mappings;

    fn mapper(strategy: LoadBalanceStrategy) -> IntranetMapper {
        let mut mappings = IntranetMappings::new();
        mappings.insert(
            "live.example".to_string(),
            IntranetMapping::load_balanced(["10.0.0.1", "10.0.0.2", "10.0.0.3"], strategy),
        );
        mappings.insert("vod.example".to_string(), IntranetMapping::single("10.0.0.9"));
        IntranetMapper::new(true, mappings)
    }

    #[test]
    fn test_round_robin_rotates() {
        let m = mapper(LoadBalanceStrategy::RoundRobin);
        let picks: Vec<String> = (0..4).filter_map(|_| m.resolve_ip("live.example")).collect();
        assert_eq!(picks, ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1"]);
    }

    #[test]
    fn test_first_available_skips_quarantined() {
        let m = mapper(LoadBalanceStrategy::FirstAvailable);
        m.mark_failed("10.0.0.1", "live.example");
        assert_eq!(m.resolve_ip("live.example").as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_random_stays_in_live_set() {
        let m = mapper(LoadBalanceStrategy::Random);
        m.mark_failed("10.0.0.2", "live.example");
        for _ in 0..50 {
            let ip = m.resolve_ip("live.example").unwrap();
            assert_ne!(ip, "10.0.0.2");
        }
    }

    #[test]
    fn test_all_quarantined_resets_domain() {
        let m = mapper(LoadBalanceStrategy::FirstAvailable);
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            m.mark_failed(ip, "live.example");
        }
        assert_eq!(m.resolve_ip("live.example").as_deref(), Some("10.0.0.1"));
        // quarantine was cleared, so the next pick is unaffected
        assert_eq!(m.resolve_ip("live.example").as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_skips_quarantined_until_expiry() {
        let m = mapper(LoadBalanceStrategy::RoundRobin);
        m.mark_failed("10.0.0.2", "live.example");

        let picks: Vec<String> = (0..4).filter_map(|_| m.resolve_ip("live.example")).collect();
        assert_eq!(picks, ["10.0.0.1", "10.0.0.3", "10.0.0.1", "10.0.0.3"]);

        tokio::time::advance(QUARANTINE).await;
        let picks: Vec<String> = (0..3).filter_map(|_| m.resolve_ip("live.example")).collect();
        assert_eq!(picks, ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_round_robin_all_quarantined_cycles_full_list() {
        let m = mapper(LoadBalanceStrategy::RoundRobin);
        assert_eq!(m.resolve_ip("live.example").as_deref(), Some("10.0.0.1"));

        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            m.mark_failed(ip, "live.example");
        }
        let picks: Vec<String> = (0..3).filter_map(|_| m.resolve_ip("live.example")).collect();
        assert_eq!(picks, ["10.0.0.2", "10.0.0.3", "10.0.0.1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quarantine_expires() {
        let m = mapper(LoadBalanceStrategy::FirstAvailable);
        m.mark_failed("10.0.0.1", "live.example");

        tokio::time::advance(QUARANTINE - Duration::from_secs(1)).await;
        assert_eq!(m.resolve_ip("live.example").as_deref(), Some("10.0.0.2"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(m.resolve_ip("live.example").as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_rewrite_url_only_when_enabled() {
        let m = mapper(LoadBalanceStrategy::RoundRobin);
        let url = Url::parse("https://vod.example/a/b.m3u8?x=1").unwrap();

        let remapped = m.rewrite_url(&url).unwrap();
        assert_eq!(remapped.url.as_str(), "https://10.0.0.9/a/b.m3u8?x=1");
        assert_eq!(remapped.domain, "vod.example");

        m.set_enabled(false);
        assert!(m.rewrite_url(&url).is_none());
    }

    #[test]
    fn test_unmapped_host_untouched() {
        let m = mapper(LoadBalanceStrategy::RoundRobin);
        let url = Url::parse("https://other.example/x.ts").unwrap();
        assert!(m.rewrite_url(&url).is_none());
    }

    #[test]
    fn test_network_status_and_merge() {
        let m = IntranetMapper::new(false, default_intranet_mappings());
        assert_eq!(
            m.network_status(),
            NetworkStatus {
                mode: NetworkMode::Internet,
                enabled: false,
                mapping_count: 10,
            }
        );

        let mut extra = IntranetMappings::new();
        extra.insert("new.example".to_string(), IntranetMapping::single("10.1.1.1"));
        m.merge_mappings(extra);
        m.set_enabled(true);

        let status = m.network_status();
        assert_eq!(status.mode, NetworkMode::Intranet);
        assert_eq!(status.mapping_count, 11);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["mappingCount"], 11);
        assert_eq!(json["mode"], "intranet");
    }
}
