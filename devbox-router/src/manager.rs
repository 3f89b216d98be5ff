use std::net::SocketAddr;
use std::time::Duration;

use devbox_core::{RouteSpec, User};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::caddy::{CaddyRoute, HostClaim};
use crate::config::CaddyConfig;
use crate::error::{Result, RouteError};

/// Read-modify-write rounds before a rejected write is reported.
const WRITE_ATTEMPTS: u32 = 3;

/// Keeps one reverse-proxy route per user in Caddy's route table.
///
/// Routes created here carry `@id = "devbox-<login>"` and are rewritten
/// through Caddy's `/id/<id>` endpoint, so concurrent inserts that shift the
/// table cannot redirect a write onto someone else's route. Routes without an
/// `@id` (written by older deployments) are found by host and addressed by
/// index. A route that serves the user's host alongside other hosts is never
/// replaced; the user's host is taken out of it and the user gets a dedicated
/// route.
///
/// # Examples
///
/// ```rust,no_run
/// # async fn example() -> devbox_router::Result<()> {
/// use devbox_core::User;
/// use devbox_router::{CaddyConfig, RouteManager};
///
/// let routes = RouteManager::new(CaddyConfig::new("http://127.0.0.1:2019", "code.example.com"))?;
/// routes.ensure_route(&User::new("alice", 42), "10.0.0.42:8080").await?;
/// # Ok(())
/// # }
/// ```
pub struct RouteManager {
    client: Client,
    admin_url: String,
    routes_url: String,
    config: CaddyConfig,
}

/// Position of a route in the table, plus its `@id` when it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    index: usize,
    id: Option<String>,
}

/// Routes in a table that serve one host.
#[derive(Debug, Default, PartialEq, Eq)]
struct HostRoutes {
    /// Routes serving only the host; the one carrying the user's `@id` first.
    owned: Vec<Slot>,
    shared: Vec<Slot>,
}

impl RouteManager {
    pub fn new(config: CaddyConfig) -> Result<Self> {
        let admin = Url::parse(&config.admin_url)
            .map_err(|e| RouteError::Config(format!("invalid admin url '{}': {e}", config.admin_url)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RouteError::Config(format!("failed to create HTTP client: {e}")))?;

        let admin_url = admin.as_str().trim_end_matches('/').to_string();
        let routes_url = format!("{admin_url}/config/apps/http/servers/{}/routes", config.server);

        Ok(Self {
            client,
            admin_url,
            routes_url,
            config,
        })
    }

    pub fn config(&self) -> &CaddyConfig {
        &self.config
    }

    /// Public URL of the user's workspace.
    pub fn public_url(&self, user: &User) -> String {
        format!("https://{}", user.subdomain(&self.config.base_domain))
    }

    /// Point `<login>.<base_domain>` at `upstream_address` (`ip:port`).
    ///
    /// A write rejected by Caddy (for instance a concurrent call for the same
    /// user inserted the route first) re-reads the table and tries again.
    pub async fn ensure_route(&self, user: &User, upstream_address: &str) -> Result<RouteSpec> {
        let upstream: SocketAddr = upstream_address
            .parse()
            .map_err(|_| RouteError::InvalidAddress(upstream_address.to_string()))?;

        let desired = RouteSpec::for_user(user, &self.config.base_domain, upstream.to_string());
        let id = route_id(user);
        let body = serde_json::to_value(CaddyRoute::from_spec(id.clone(), &desired))
            .map_err(|e| RouteError::Protocol(e.to_string()))?;

        let mut attempt = 1;
        loop {
            match self.apply_route(user, &id, &desired, &body).await {
                Ok(()) => return Ok(desired),
                Err(RouteError::RouteUpsert { status, body: reason }) if attempt < WRITE_ATTEMPTS => {
                    warn!(login = %user.login, status, %reason, attempt, "Route write rejected, re-reading table");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Host routes currently installed, in table order.
    pub async fn routes(&self) -> Result<Vec<RouteSpec>> {
        Ok(self
            .fetch_table()
            .await?
            .unwrap_or_default()
            .iter()
            .filter_map(decode)
            .filter_map(|route| route.to_spec())
            .collect())
    }

    /// Stop routing the user's host: dedicated routes are deleted, shared
    /// routes lose the host. Returns how many routes were touched.
    pub async fn remove_route(&self, user: &User) -> Result<usize> {
        let host = user.subdomain(&self.config.base_domain);
        let Some(table) = self.fetch_table().await? else {
            return Ok(0);
        };
        let found = locate(&table, &route_id(user), &host);

        self.release_shared(&table, &found.shared, &host).await?;
        let mut owned = found.owned;
        owned.sort_by(|a, b| b.index.cmp(&a.index));
        for slot in &owned {
            self.send(self.client.delete(self.slot_url(slot))).await?;
        }

        let removed = owned.len() + found.shared.len();
        if removed > 0 {
            info!(login = %user.login, host = %host, removed, "Removed route");
        }
        Ok(removed)
    }

    async fn apply_route(&self, user: &User, id: &str, desired: &RouteSpec, body: &Value) -> Result<()> {
        let host = &desired.match_host;
        let Some(table) = self.fetch_table().await? else {
            info!(login = %user.login, %host, upstream = %desired.upstream_address, "Creating route table");
            self.send(self.client.put(&self.routes_url).json(&[body])).await?;
            return Ok(());
        };

        let found = locate(&table, id, host);
        self.release_shared(&table, &found.shared, host).await?;

        let Some((keep, rest)) = found.owned.split_first() else {
            info!(login = %user.login, %host, upstream = %desired.upstream_address, "Adding route");
            // PUT on an array index inserts, so host routes land ahead of catch-alls.
            self.send(self.client.put(self.index_url(0)).json(body)).await?;
            return Ok(());
        };

        let mut duplicates = rest.to_vec();
        duplicates.sort_by(|a, b| b.index.cmp(&a.index));
        for slot in &duplicates {
            warn!(%host, index = slot.index, "Removing duplicate route");
            self.send(self.client.delete(self.slot_url(slot))).await?;
        }

        info!(login = %user.login, %host, upstream = %desired.upstream_address, "Replacing route");
        self.send(self.client.request(Method::PATCH, self.slot_url(keep)).json(body))
            .await?;
        Ok(())
    }

    /// Drop `host` from routes that also serve other traffic.
    async fn release_shared(&self, table: &[Value], shared: &[Slot], host: &str) -> Result<()> {
        for slot in shared {
            let Some(route) = table.get(slot.index) else {
                continue;
            };
            info!(%host, index = slot.index, "Taking host out of shared route");
            self.send(
                self.client
                    .request(Method::PATCH, self.slot_url(slot))
                    .json(&without_host(route, host)),
            )
            .await?;
        }
        Ok(())
    }

    fn index_url(&self, index: usize) -> String {
        format!("{}/{}", self.routes_url, index)
    }

    fn id_url(&self, id: &str) -> String {
        format!("{}/id/{}", self.admin_url, id)
    }

    fn slot_url(&self, slot: &Slot) -> String {
        match &slot.id {
            Some(id) => self.id_url(id),
            None => self.index_url(slot.index),
        }
    }

    /// Raw route table; `None` when the server has no `routes` key yet.
    async fn fetch_table(&self) -> Result<Option<Vec<Value>>> {
        let response = self.send(self.client.get(&self.routes_url)).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text).map_err(|e| RouteError::Protocol(format!("route table: {e}")))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Caddy admin call succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RouteError::RouteUpsert {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

fn route_id(user: &User) -> String {
    format!("devbox-{}", user.login)
}

fn decode(value: &Value) -> Option<CaddyRoute> {
    serde_json::from_value(value.clone()).ok()
}

fn locate(table: &[Value], id: &str, host: &str) -> HostRoutes {
    let mut found = HostRoutes::default();
    for (index, value) in table.iter().enumerate() {
        let Some(route) = decode(value) else {
            continue;
        };
        let keyed = route.id.as_deref() == Some(id);
        let slot = Slot { index, id: route.id.clone() };
        match route.claim(host) {
            _ if keyed => found.owned.push(slot),
            HostClaim::Exclusive => found.owned.push(slot),
            HostClaim::Shared => found.shared.push(slot),
            HostClaim::None => {}
        }
    }
    found.owned.sort_by_key(|slot| (slot.id.as_deref() != Some(id), slot.index));
    found
}

/// `route` with `host` removed from its host matchers. Matcher sets left
/// without hosts are dropped; an empty host list would match every host.
fn without_host(route: &Value, host: &str) -> Value {
    let mut route = route.clone();
    if let Some(sets) = route.get_mut("match").and_then(Value::as_array_mut) {
        sets.retain_mut(|set| {
            let Some(hosts) = set.get_mut("host").and_then(Value::as_array_mut) else {
                return true;
            };
            hosts.retain(|h| !h.as_str().is_some_and(|h| h.eq_ignore_ascii_case(host)));
            !hosts.is_empty()
        });
    }
    route
}
