//! Route objects as stored under `apps.http.servers.<name>.routes`.

use devbox_core::RouteSpec;
use serde::{Deserialize, Serialize};

const REVERSE_PROXY: &str = "reverse_proxy";

/// How a route relates to one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostClaim {
    None,
    /// Every matcher set matches this host and nothing else.
    Exclusive,
    /// The host is one of several things the route matches.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CaddyRoute {
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "match", default)]
    pub matchers: Vec<HostMatcher>,
    #[serde(default)]
    pub handle: Vec<Handler>,
    #[serde(default)]
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct HostMatcher {
    #[serde(default)]
    pub host: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Handler {
    pub handler: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<Upstream>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Upstream {
    pub dial: String,
}

impl CaddyRoute {
    pub fn from_spec(id: String, spec: &RouteSpec) -> Self {
        Self {
            id: Some(id),
            matchers: vec![HostMatcher {
                host: vec![spec.match_host.clone()],
            }],
            handle: vec![Handler {
                handler: REVERSE_PROXY.to_string(),
                upstreams: vec![Upstream {
                    dial: spec.upstream_address.clone(),
                }],
            }],
            terminal: spec.terminal,
        }
    }

    pub fn matches_host(&self, host: &str) -> bool {
        self.matchers
            .iter()
            .any(|m| m.host.iter().any(|h| h.eq_ignore_ascii_case(host)))
    }

    pub fn claim(&self, host: &str) -> HostClaim {
        if !self.matches_host(host) {
            return HostClaim::None;
        }
        let exclusive = self.matchers.iter().all(|m| {
            !m.host.is_empty() && m.host.iter().all(|h| h.eq_ignore_ascii_case(host))
        });
        if exclusive {
            HostClaim::Exclusive
        } else {
            HostClaim::Shared
        }
    }

    /// Host route pointing at a reverse-proxy upstream; other routes have no
    /// `RouteSpec` form.
    pub fn to_spec(&self) -> Option<RouteSpec> {
        let match_host = self.matchers.iter().flat_map(|m| m.host.iter()).next()?;
        let upstream = self
            .handle
            .iter()
            .filter(|h| h.handler == REVERSE_PROXY)
            .flat_map(|h| h.upstreams.iter())
            .next()?;

        Some(RouteSpec {
            match_host: match_host.clone(),
            upstream_address: upstream.dial.clone(),
            terminal: self.terminal,
        })
    }
}
