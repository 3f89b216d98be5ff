use std::sync::Arc;

use async_trait::async_trait;
use devbox_core::{WorkloadInfo, WorkloadKind, WorkloadRef};
use reqwest::{header, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ProxmoxConfig;
use crate::error::{ControlPlaneError, Result};
use crate::session::{Session, SessionCache};
use crate::types::{ApiResponse, CloneRequest, ClusterNode, GuestEntry, TaskStatus, TicketData};
use crate::ControlPlane;

enum Auth {
    Ticket {
        username: String,
        password: String,
        cache: SessionCache,
    },
    Token {
        header: String,
    },
}

/// HTTPS client for the Proxmox VE API.
pub struct ProxmoxClient {
    http: reqwest::Client,
    base: String,
    auth: Auth,
    config: ProxmoxConfig,
}

impl ProxmoxClient {
    pub fn new(config: ProxmoxConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| ControlPlaneError::Config(format!("invalid url '{}': {e}", config.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ControlPlaneError::Config(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.insecure_tls)
            .user_agent(concat!("devbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ControlPlaneError::Config(format!("failed to create HTTP client: {e}")))?;

        let auth = match (&config.token_id, &config.token_secret) {
            (Some(id), Some(secret)) => Auth::Token {
                header: format!("PVEAPIToken={id}={secret}"),
            },
            _ => {
                if config.username.is_empty() {
                    return Err(ControlPlaneError::Config(
                        "either username/password or token_id/token_secret is required".into(),
                    ));
                }
                Auth::Ticket {
                    username: config.qualified_username(),
                    password: config.password.clone(),
                    cache: SessionCache::new(),
                }
            }
        };

        let base = format!("{}/api2/json", url.as_str().trim_end_matches('/'));

        Ok(Self {
            http,
            base,
            auth,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn login(&self, username: &str, password: &str) -> Result<Session> {
        debug!(username, "Requesting Proxmox session ticket");

        let response = self
            .http
            .post(self.url("/access/ticket"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ControlPlaneError::Auth(format!(
                "login rejected for {username}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::Protocol(format!(
                "login failed with {status}: {}",
                error_message(&body)
            )));
        }

        let ticket: ApiResponse<TicketData> = response.json().await?;
        info!(username, "Authenticated with Proxmox");

        Ok(Session {
            ticket: ticket.data.ticket,
            csrf_token: ticket.data.csrf_prevention_token,
        })
    }

    async fn session(&self) -> Result<Option<Arc<Session>>> {
        match &self.auth {
            Auth::Token { .. } => Ok(None),
            Auth::Ticket {
                username,
                password,
                cache,
            } => cache
                .get_or_login(|| self.login(username, password))
                .await
                .map(Some),
        }
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        form: Option<&[(String, String)]>,
        session: Option<&Session>,
    ) -> Result<Response> {
        let mut request = self.http.request(method.clone(), self.url(path));

        match (&self.auth, session) {
            (Auth::Token { header }, _) => {
                request = request.header(header::AUTHORIZATION, header);
            }
            (Auth::Ticket { .. }, Some(session)) => {
                request = request
                    .header(header::COOKIE, format!("PVEAuthCookie={}", session.ticket))
                    .header("CSRFPreventionToken", &session.csrf_token);
            }
            (Auth::Ticket { .. }, None) => {}
        }

        if let Some(form) = form {
            request = request.form(form);
        }

        Ok(request.send().await?)
    }

    /// Issue one API call. A `401` means the ticket expired: the session is
    /// refreshed once and the call retried before giving up.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<T> {
        let session = self.session().await?;
        let mut response = self.send(&method, path, form, session.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            match (&self.auth, &session) {
                (
                    Auth::Ticket {
                        username,
                        password,
                        cache,
                    },
                    Some(stale),
                ) => {
                    warn!(path, "Session ticket rejected, re-authenticating");
                    let fresh = cache
                        .refresh(stale, || self.login(username, password))
                        .await?;
                    response = self.send(&method, path, form, Some(fresh.as_ref())).await?;
                    if response.status() == StatusCode::UNAUTHORIZED {
                        return Err(ControlPlaneError::Auth(
                            "ticket rejected after re-authentication".into(),
                        ));
                    }
                }
                _ => return Err(ControlPlaneError::Auth("API token rejected".into())),
            }
        }

        decode(&method, path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, form: &[(String, String)]) -> Result<T> {
        self.call(Method::POST, path, Some(form)).await
    }

    async fn put<T: DeserializeOwned>(&self, path: &str, form: &[(String, String)]) -> Result<T> {
        self.call(Method::PUT, path, Some(form)).await
    }

    /// Poll a task until it stops, bounded by the configured task timeout.
    async fn wait_for_task(&self, node: &str, upid: &str) -> Result<()> {
        let timeout = self.config.task_timeout();
        let deadline = Instant::now() + timeout;
        let path = format!("/nodes/{node}/tasks/{upid}/status");

        loop {
            let task: TaskStatus = self.get(&path).await?;
            if task.is_finished() {
                if task.succeeded() {
                    debug!(upid, "Task finished");
                    return Ok(());
                }
                return Err(ControlPlaneError::Provisioning(format!(
                    "task {upid} failed: {}",
                    task.exitstatus.unwrap_or_else(|| "no exit status".into())
                )));
            }

            if Instant::now() >= deadline {
                return Err(ControlPlaneError::TaskTimeout {
                    upid: upid.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.config.task_poll_interval()).await;
        }
    }

    async fn post_status(&self, workload: &WorkloadRef, action: &str) -> Result<()> {
        let path = format!(
            "/nodes/{}/{}/{}/status/{action}",
            workload.node, workload.kind, workload.guest_id
        );
        let _upid: serde_json::Value = self.post(&path, &[]).await?;
        info!(guest_id = workload.guest_id, node = %workload.node, action, "Request accepted");
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(method: &Method, path: &str, response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        let body: ApiResponse<T> = response.json().await?;
        return Ok(body.data);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{method} {path} returned {status}: {}", error_message(&body));

    if status == StatusCode::FORBIDDEN {
        Err(ControlPlaneError::Auth(message))
    } else if *method == Method::GET {
        Err(ControlPlaneError::Protocol(message))
    } else {
        Err(ControlPlaneError::Provisioning(message))
    }
}

/// Pull the human-readable part out of a Proxmox error body.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };

    let mut parts = Vec::new();
    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        parts.push(message.trim().to_string());
    }
    if let Some(errors) = value.get("errors").and_then(|e| e.as_object()) {
        for (field, reason) in errors {
            let reason = reason.as_str().map(str::to_string).unwrap_or_else(|| reason.to_string());
            parts.push(format!("{field}: {}", reason.trim()));
        }
    }

    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join("; ")
    }
}

fn classify_clone_error(err: ControlPlaneError, guest_id: u32) -> ControlPlaneError {
    match err {
        ControlPlaneError::Provisioning(message) if message.contains("already exists") => {
            ControlPlaneError::GuestExists(guest_id)
        }
        other => other,
    }
}

#[async_trait]
impl ControlPlane for ProxmoxClient {
    async fn get_workload_info(&self, workload: &WorkloadRef) -> Result<WorkloadInfo> {
        let info = self
            .list_workloads(&workload.node, workload.kind)
            .await?
            .into_iter()
            .find(|info| info.guest_id == workload.guest_id)
            .unwrap_or_else(|| WorkloadInfo::missing(workload));

        debug!(guest_id = workload.guest_id, status = %info.status, "Fetched workload info");
        Ok(info)
    }

    async fn list_workloads(&self, node: &str, kind: WorkloadKind) -> Result<Vec<WorkloadInfo>> {
        // `full=1` adds `qmpstatus`, which tells paused VMs from running ones.
        let path = match kind {
            WorkloadKind::Vm => format!("/nodes/{node}/{kind}?full=1"),
            WorkloadKind::Container => format!("/nodes/{node}/{kind}"),
        };
        let entries: Vec<GuestEntry> = self.get(&path).await?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let vmid = entry.vmid;
                let info = entry.into_info(node, kind);
                if info.is_none() {
                    warn!(vmid, node, "Skipping guest with out-of-range id");
                }
                info
            })
            .collect())
    }

    async fn clone_from_template(
        &self,
        template: &WorkloadRef,
        request: &CloneRequest,
    ) -> Result<WorkloadRef> {
        let target = WorkloadRef::new(request.new_guest_id, &template.node, template.kind);
        info!(
            template = template.guest_id,
            guest_id = target.guest_id,
            name = %request.name,
            "Cloning template"
        );

        let path = format!(
            "/nodes/{}/{}/{}/clone",
            template.node, template.kind, template.guest_id
        );
        let upid: String = self
            .post(&path, &request.clone_params(template.kind))
            .await
            .map_err(|e| classify_clone_error(e, target.guest_id))?;

        self.wait_for_task(&template.node, &upid)
            .await
            .map_err(|e| classify_clone_error(e, target.guest_id))?;

        let params = request.resources.config_params(template.kind, &request.address);
        self.update_config(&target, &params).await?;

        info!(guest_id = target.guest_id, address = %request.address, "Clone configured");
        Ok(target)
    }

    async fn update_config(&self, workload: &WorkloadRef, params: &[(String, String)]) -> Result<()> {
        let path = format!(
            "/nodes/{}/{}/{}/config",
            workload.node, workload.kind, workload.guest_id
        );
        let _: serde_json::Value = self.put(&path, params).await?;
        Ok(())
    }

    async fn start(&self, workload: &WorkloadRef) -> Result<()> {
        self.post_status(workload, "start").await
    }

    async fn stop(&self, workload: &WorkloadRef) -> Result<()> {
        self.post_status(workload, "stop").await
    }

    async fn cluster_status(&self) -> Result<Vec<ClusterNode>> {
        self.get("/cluster/status").await
    }
}
