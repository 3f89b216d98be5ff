//! In-memory control plane for tests.
//!
//! Guests live in a map keyed by guest id. A started guest reports
//! `starting` for a configurable number of reads before it turns `running`,
//! and per-guest status scripts let tests walk a guest through arbitrary
//! states. Every trait call is recorded, and every configuration applied
//! (by a clone or by `update_config`) is kept per guest.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use devbox_core::{Status, WorkloadInfo, WorkloadKind, WorkloadRef};

use crate::error::{ControlPlaneError, Result};
use crate::types::{CloneRequest, ClusterNode};
use crate::ControlPlane;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetInfo(u32),
    List { node: String, kind: WorkloadKind },
    Clone { template: u32, guest_id: u32 },
    UpdateConfig(u32),
    Start(u32),
    Stop(u32),
    ClusterStatus,
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Call::Clone { .. } | Call::UpdateConfig(_) | Call::Start(_) | Call::Stop(_)
        )
    }
}

#[derive(Debug)]
struct Guest {
    info: WorkloadInfo,
    script: VecDeque<Status>,
    // Reads left before a starting guest reports running; `None` never boots.
    boot_reads_left: Option<u32>,
}

#[derive(Debug)]
struct State {
    guests: HashMap<u32, Guest>,
    calls: Vec<Call>,
    clone_requests: Vec<CloneRequest>,
    config_updates: Vec<(u32, Vec<(String, String)>)>,
    boot_reads: Option<u32>,
    clone_error: Option<ControlPlaneError>,
    // One-shot: consumed by the next configuration attempt.
    config_error: Option<ControlPlaneError>,
    start_error: Option<ControlPlaneError>,
    info_error: Option<ControlPlaneError>,
    cluster_error: Option<ControlPlaneError>,
}

#[derive(Debug)]
pub struct MockControlPlane {
    state: Mutex<State>,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                guests: HashMap::new(),
                calls: Vec::new(),
                clone_requests: Vec::new(),
                config_updates: Vec::new(),
                boot_reads: Some(1),
                clone_error: None,
                config_error: None,
                start_error: None,
                info_error: None,
                cluster_error: None,
            }),
        }
    }
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_guest(&self, workload: &WorkloadRef, status: Status) {
        let mut info = WorkloadInfo::missing(workload);
        info.status = status;
        info.name = format!("guest-{}", workload.guest_id);
        self.lock().guests.insert(
            workload.guest_id,
            Guest {
                info,
                script: VecDeque::new(),
                boot_reads_left: None,
            },
        );
    }

    /// Statuses reported by successive reads of `guest_id`; the last one sticks.
    pub fn script_status(&self, guest_id: u32, statuses: impl IntoIterator<Item = Status>) {
        if let Some(guest) = self.lock().guests.get_mut(&guest_id) {
            guest.script.extend(statuses);
        }
    }

    /// Number of reads a started guest reports `starting` before `running`.
    pub fn set_boot_reads(&self, reads: u32) {
        self.lock().boot_reads = Some(reads);
    }

    pub fn set_never_boots(&self) {
        self.lock().boot_reads = None;
    }

    pub fn fail_clone(&self, err: ControlPlaneError) {
        self.lock().clone_error = Some(err);
    }

    /// Fail the next configuration step once, whether it runs inside a clone
    /// or through `update_config`. A failing clone still leaves the guest
    /// behind, stopped and unconfigured.
    pub fn fail_config_once(&self, err: ControlPlaneError) {
        self.lock().config_error = Some(err);
    }

    pub fn fail_start(&self, err: ControlPlaneError) {
        self.lock().start_error = Some(err);
    }

    pub fn fail_info(&self, err: ControlPlaneError) {
        self.lock().info_error = Some(err);
    }

    pub fn fail_cluster_status(&self, err: ControlPlaneError) {
        self.lock().cluster_error = Some(err);
    }

    pub fn status_of(&self, guest_id: u32) -> Status {
        self.lock()
            .guests
            .get(&guest_id)
            .map(|guest| guest.info.status)
            .unwrap_or(Status::Missing)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn clone_requests(&self) -> Vec<CloneRequest> {
        self.lock().clone_requests.clone()
    }

    /// Configuration parameters successfully applied, in order.
    pub fn config_updates(&self) -> Vec<(u32, Vec<(String, String)>)> {
        self.lock().config_updates.clone()
    }

    /// Force the reported status of an existing guest, dropping any script.
    pub fn set_status(&self, guest_id: u32, status: Status) {
        if let Some(guest) = self.lock().guests.get_mut(&guest_id) {
            guest.info.status = status;
            guest.script.clear();
        }
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

impl Guest {
    fn read(&mut self) -> WorkloadInfo {
        if let Some(next) = self.script.pop_front() {
            self.info.status = next;
        } else if self.info.status == Status::Starting {
            match self.boot_reads_left {
                Some(0) => self.info.status = Status::Running,
                Some(n) => self.boot_reads_left = Some(n - 1),
                None => {}
            }
        }
        self.info.clone()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn get_workload_info(&self, workload: &WorkloadRef) -> Result<WorkloadInfo> {
        let mut state = self.lock();
        state.calls.push(Call::GetInfo(workload.guest_id));
        if let Some(err) = &state.info_error {
            return Err(err.clone());
        }

        Ok(state
            .guests
            .get_mut(&workload.guest_id)
            .map(Guest::read)
            .unwrap_or_else(|| WorkloadInfo::missing(workload)))
    }

    async fn list_workloads(&self, node: &str, kind: WorkloadKind) -> Result<Vec<WorkloadInfo>> {
        let mut state = self.lock();
        state.calls.push(Call::List {
            node: node.to_string(),
            kind,
        });

        let mut infos: Vec<WorkloadInfo> = state
            .guests
            .values()
            .filter(|guest| guest.info.node == node && guest.info.kind == kind)
            .map(|guest| guest.info.clone())
            .collect();
        infos.sort_by_key(|info| info.guest_id);
        Ok(infos)
    }

    async fn clone_from_template(
        &self,
        template: &WorkloadRef,
        request: &CloneRequest,
    ) -> Result<WorkloadRef> {
        let mut state = self.lock();
        state.calls.push(Call::Clone {
            template: template.guest_id,
            guest_id: request.new_guest_id,
        });
        state.clone_requests.push(request.clone());

        if let Some(err) = &state.clone_error {
            return Err(err.clone());
        }
        if state.guests.contains_key(&request.new_guest_id) {
            return Err(ControlPlaneError::GuestExists(request.new_guest_id));
        }

        let target = WorkloadRef::new(request.new_guest_id, &template.node, template.kind);
        let mut info = WorkloadInfo::missing(&target);
        info.status = Status::Stopped;
        info.name = request.name.clone();
        info.cpu_count = request.resources.cores;
        info.max_memory_bytes = request.resources.memory_mb * 1024 * 1024;
        state.guests.insert(
            target.guest_id,
            Guest {
                info,
                script: VecDeque::new(),
                boot_reads_left: None,
            },
        );

        if let Some(err) = state.config_error.take() {
            return Err(err);
        }
        let params = request.resources.config_params(template.kind, &request.address);
        state.config_updates.push((target.guest_id, params));
        Ok(target)
    }

    async fn update_config(&self, workload: &WorkloadRef, params: &[(String, String)]) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::UpdateConfig(workload.guest_id));
        if !state.guests.contains_key(&workload.guest_id) {
            return Err(ControlPlaneError::Provisioning(format!(
                "guest {} does not exist",
                workload.guest_id
            )));
        }
        if let Some(err) = state.config_error.take() {
            return Err(err);
        }
        state.config_updates.push((workload.guest_id, params.to_vec()));
        Ok(())
    }

    async fn start(&self, workload: &WorkloadRef) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Start(workload.guest_id));
        if let Some(err) = &state.start_error {
            return Err(err.clone());
        }

        let boot_reads = state.boot_reads;
        let guest = state.guests.get_mut(&workload.guest_id).ok_or_else(|| {
            ControlPlaneError::Provisioning(format!("guest {} does not exist", workload.guest_id))
        })?;
        if guest.info.status.is_startable() {
            guest.info.status = Status::Starting;
            guest.boot_reads_left = boot_reads;
        }
        Ok(())
    }

    async fn stop(&self, workload: &WorkloadRef) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Stop(workload.guest_id));

        let guest = state.guests.get_mut(&workload.guest_id).ok_or_else(|| {
            ControlPlaneError::Provisioning(format!("guest {} does not exist", workload.guest_id))
        })?;
        guest.info.status = Status::Stopped;
        guest.script.clear();
        Ok(())
    }

    async fn cluster_status(&self) -> Result<Vec<ClusterNode>> {
        let mut state = self.lock();
        state.calls.push(Call::ClusterStatus);
        if let Some(err) = &state.cluster_error {
            return Err(err.clone());
        }

        Ok(vec![ClusterNode {
            kind: "node".to_string(),
            name: "pve".to_string(),
            online: Some(1),
            ip: Some("192.0.2.10".to_string()),
        }])
    }
}
