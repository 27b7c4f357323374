//! Intranet host mappings for the streaming proxy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a load-balanced mapping chooses among its IPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    #[default]
    RoundRobin,
    Random,
    FirstAvailable,
}

/// Where requests for one upstream hostname are sent in intranet mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntranetMapping {
    /// Always the same IP
    Single { ip: String },
    /// One of several IPs chosen per request
    #[serde(rename = "loadbalance")]
    LoadBalanced {
        ips: Vec<String>,
        #[serde(default)]
        strategy: LoadBalanceStrategy,
        /// Starting point of the round-robin rotation
        #[serde(default, rename = "currentIndex")]
        rotation_index: usize,
    },
}

impl IntranetMapping {
    pub fn single(ip: impl Into<String>) -> Self {
        Self::Single { ip: ip.into() }
    }

    pub fn load_balanced<I, S>(ips: I, strategy: LoadBalanceStrategy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::LoadBalanced {
            ips: ips.into_iter().map(Into::into).collect(),
            strategy,
            rotation_index: 0,
        }
    }
}

/// Domain to mapping table.
pub type IntranetMappings = HashMap<String, IntranetMapping>;

/// Built-in mapping table for the campus video platform.
pub fn default_intranet_mappings() -> IntranetMappings {
    let rr = LoadBalanceStrategy::RoundRobin;
    let mut m = IntranetMappings::new();

    m.insert(
        "cbiz.yanhekt.cn".to_string(),
        IntranetMapping::load_balanced(["10.0.34.22", "10.0.34.21"], rr),
    );

    // Live streaming servers
    let live: [(&str, [&str; 6]); 6] = [
        ("clive8.yanhekt.cn", ["10.1.233.208", "10.1.233.201", "10.1.233.210", "10.1.233.207", "10.1.233.209", "10.1.233.206"]),
        ("clive9.yanhekt.cn", ["10.1.233.206", "10.1.233.207", "10.1.233.210", "10.1.233.208", "10.1.233.209", "10.1.233.201"]),
        ("clive10.yanhekt.cn", ["10.1.233.209", "10.1.233.208", "10.1.233.210", "10.1.233.207", "10.1.233.201", "10.1.233.206"]),
        ("clive11.yanhekt.cn", ["10.1.233.210", "10.1.233.207", "10.1.233.208", "10.1.233.209", "10.1.233.201", "10.1.233.206"]),
        ("clive12.yanhekt.cn", ["10.1.233.208", "10.1.233.209", "10.1.233.201", "10.1.233.206", "10.1.233.210", "10.1.233.207"]),
        ("clive13.yanhekt.cn", ["10.1.233.210", "10.1.233.207", "10.1.233.209", "10.1.233.206", "10.1.233.208", "10.1.233.201"]),
    ];
    for (domain, ips) in live {
        m.insert(domain.to_string(), IntranetMapping::load_balanced(ips, rr));
    }

    m.insert("clive14.yanhekt.cn".to_string(), IntranetMapping::single("10.0.34.207"));
    m.insert("clive15.yanhekt.cn".to_string(), IntranetMapping::single("10.0.34.208"));

    // Recorded video server
    m.insert("cvideo.yanhekt.cn".to_string(), IntranetMapping::single("10.0.34.24"));

    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_load_balanced() {
        let json = r#"{"type":"loadbalance","ips":["10.0.0.1","10.0.0.2"],"strategy":"random"}"#;
        let mapping: IntranetMapping = serde_json::from_str(json).unwrap();
        assert_eq!(
            mapping,
            IntranetMapping::LoadBalanced {
                ips: vec!["10.0.0.1".into(), "10.0.0.2".into()],
                strategy: LoadBalanceStrategy::Random,
                rotation_index: 0,
            }
        );
    }

    #[test]
    fn test_deserialize_single() {
        let mapping: IntranetMapping = serde_json::from_str(r#"{"type":"single","ip":"10.0.0.9"}"#).unwrap();
        assert_eq!(mapping, IntranetMapping::single("10.0.0.9"));
    }

    #[test]
    fn test_defaults_cover_recorded_host() {
        let defaults = default_intranet_mappings();
        assert_eq!(defaults.len(), 10);
        assert_eq!(
            defaults.get("cvideo.yanhekt.cn"),
            Some(&IntranetMapping::single("10.0.34.24"))
        );
    }
}
