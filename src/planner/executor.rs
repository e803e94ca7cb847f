//! Sequential plan execution with per-action state commits.
//!
//! The executor walks the plan's action sequence in order. Before each
//! mutation it resolves reference tokens against committed state outputs;
//! after each mutation it waits for the resource to stabilize and commits
//! the updated state. A failed action halts execution: remaining actions
//! are skipped, never attempted, so a re-run picks up exactly where the
//! failure left off.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{extract_references, DeclHasher, Reference, ResourceDecl};
use crate::error::{ApplyError, ConfigError, ProviderError, Result, StratusError};
use crate::provider::{PhysicalResource, ProviderRegistry, ResourceHandler, ResourceStatus};
use crate::state::{
    DeploymentUnitState, ResourceRecord, RunHistoryEntry, RunStatus, StateStore,
};

use super::plan::{ActionType, Plan, PlanAction};

/// Default stabilization poll interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default stabilization timeout per action.
const DEFAULT_STABILIZE_TIMEOUT: Duration = Duration::from_secs(600);

/// Outcome of a single executed action.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum ActionOutcome {
    /// The action applied and was committed.
    Succeeded,
    /// The action was attempted and failed.
    Failed {
        /// Error message.
        message: String,
    },
    /// The action was never attempted.
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
}

/// Result of one action in a run.
#[derive(Debug, Serialize)]
pub struct ActionResult {
    /// The planned action.
    pub action: PlanAction,
    /// What happened to it.
    pub outcome: ActionOutcome,
}

/// Report of a completed run.
#[derive(Debug, Serialize)]
pub struct ApplyReport {
    /// Per-action results in execution order.
    pub results: Vec<ActionResult>,
    /// Overall run status.
    pub status: RunStatus,
}

impl ApplyReport {
    /// Returns the number of actions that applied successfully.
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Succeeded))
    }

    /// Returns the number of actions that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Failed { .. }))
    }

    /// Returns the number of actions that were skipped.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Skipped { .. }))
    }

    /// Returns true if every action applied (or there was nothing to do).
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::FullyApplied | RunStatus::NoOp)
    }

    fn count(&self, predicate: impl Fn(&ActionOutcome) -> bool) -> usize {
        self.results
            .iter()
            .filter(|r| predicate(&r.outcome))
            .count()
    }
}

/// Executes plans against a provider registry.
pub struct Executor<'a> {
    registry: &'a ProviderRegistry,
    decls: &'a BTreeMap<String, ResourceDecl>,
    parameters: &'a BTreeMap<String, serde_json::Value>,
    hasher: DeclHasher,
    poll_interval: Duration,
    stabilize_timeout: Duration,
    cancel: Arc<AtomicBool>,
    lock_id: Option<&'a str>,
}

impl<'a> Executor<'a> {
    /// Creates a new executor.
    #[must_use]
    pub fn new(
        registry: &'a ProviderRegistry,
        decls: &'a BTreeMap<String, ResourceDecl>,
        parameters: &'a BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            registry,
            decls,
            parameters,
            hasher: DeclHasher::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stabilize_timeout: DEFAULT_STABILIZE_TIMEOUT,
            cancel: Arc::new(AtomicBool::new(false)),
            lock_id: None,
        }
    }

    /// Overrides stabilization timing.
    #[must_use]
    pub const fn with_timing(mut self, poll_interval: Duration, stabilize_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.stabilize_timeout = stabilize_timeout;
        self
    }

    /// Attaches a state lease to refresh between actions. A run's total
    /// duration routinely exceeds the lease expiry, so the lease must be
    /// renewed as the run progresses; losing it aborts the run.
    #[must_use]
    pub const fn with_lock(mut self, lock_id: &'a str) -> Self {
        self.lock_id = Some(lock_id);
        self
    }

    /// Returns a flag that cancels the run when set. The in-flight action
    /// finishes and commits; remaining actions are skipped.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Executes the plan sequentially, committing state after every action.
    ///
    /// # Errors
    ///
    /// Returns an error only when a state commit itself fails. Action
    /// failures are captured in the report, not returned.
    pub async fn execute<S: StateStore>(
        &self,
        plan: &Plan,
        state: &mut DeploymentUnitState,
        store: &S,
    ) -> Result<ApplyReport> {
        if plan.is_empty() {
            info!("Nothing to do: state matches the configuration");
            state.config_hash = plan.config_hash.clone();
            state.add_history(RunHistoryEntry::new(
                RunStatus::NoOp,
                &plan.config_hash,
                vec![],
            ));
            store.save(state).await?;
            return Ok(ApplyReport {
                results: vec![],
                status: RunStatus::NoOp,
            });
        }

        let mut results: Vec<ActionResult> = Vec::with_capacity(plan.actions.len());
        let mut first_error: Option<String> = None;

        for action in &plan.actions {
            if let Some(ref message) = first_error {
                warn!("Skipping '{}': previous action failed", action.name);
                results.push(ActionResult {
                    action: action.clone(),
                    outcome: ActionOutcome::Skipped {
                        reason: format!("previous action failed: {message}"),
                    },
                });
                continue;
            }

            if self.cancel.load(Ordering::SeqCst) {
                warn!("Skipping '{}': run cancelled", action.name);
                results.push(ActionResult {
                    action: action.clone(),
                    outcome: ActionOutcome::Skipped {
                        reason: String::from("run cancelled"),
                    },
                });
                continue;
            }

            if let Some(lock_id) = self.lock_id {
                store.refresh_lock(lock_id).await?;
            }

            info!("{}", action.description());
            let outcome = self.apply_action(action, state).await;

            // Commit even after a failure: a create that stabilized late
            // still recorded its physical id and must not be orphaned.
            store.save(state).await?;

            match outcome {
                Ok(()) => {
                    info!("{}: done", action.description());
                    results.push(ActionResult {
                        action: action.clone(),
                        outcome: ActionOutcome::Succeeded,
                    });
                }
                Err(e) => {
                    error!("{} failed: {e}", action.description());
                    first_error = Some(e.to_string());
                    results.push(ActionResult {
                        action: action.clone(),
                        outcome: ActionOutcome::Failed {
                            message: e.to_string(),
                        },
                    });
                }
            }
        }

        let report = self.finish(plan, state, store, results, first_error).await?;
        Ok(report)
    }

    async fn finish<S: StateStore>(
        &self,
        plan: &Plan,
        state: &mut DeploymentUnitState,
        store: &S,
        results: Vec<ActionResult>,
        first_error: Option<String>,
    ) -> Result<ApplyReport> {
        let succeeded = results
            .iter()
            .filter(|r| matches!(r.outcome, ActionOutcome::Succeeded))
            .count();
        let attempted_all = results.len() == succeeded;

        let status = if attempted_all {
            RunStatus::FullyApplied
        } else if succeeded > 0 {
            RunStatus::PartiallyApplied
        } else {
            RunStatus::Failed
        };

        if status == RunStatus::FullyApplied {
            state.config_hash = plan.config_hash.clone();
        }

        let touched: Vec<String> = results.iter().map(|r| r.action.name.clone()).collect();
        let entry = if let Some(message) = &first_error {
            RunHistoryEntry::failed(status, &plan.config_hash, touched, message)
        } else if self.cancel.load(Ordering::SeqCst) && status != RunStatus::FullyApplied {
            let notice = ApplyError::Cancelled {
                applied: succeeded,
                remaining: results.len() - succeeded,
            };
            RunHistoryEntry::failed(status, &plan.config_hash, touched, &notice.to_string())
        } else {
            RunHistoryEntry::new(status, &plan.config_hash, touched)
        };
        state.add_history(entry);
        store.save(state).await?;

        info!("Run finished: {status}");
        Ok(ApplyReport { results, status })
    }

    /// Applies one action, mutating `state` on success (and after a create
    /// reaches the provider, so the physical id is never lost).
    async fn apply_action(
        &self,
        action: &PlanAction,
        state: &mut DeploymentUnitState,
    ) -> Result<()> {
        match action.action_type {
            ActionType::Create => self.apply_create(action, state).await,
            ActionType::Update => self.apply_update(action, state).await,
            ActionType::Delete => self.apply_delete(action, state).await,
        }
    }

    async fn apply_create(
        &self,
        action: &PlanAction,
        state: &mut DeploymentUnitState,
    ) -> Result<()> {
        let decl = self.declaration(&action.name)?;
        let handler = self.registry.get(&decl.kind)?;
        let resolved = self.resolve_properties(decl, state)?;

        let created = handler.create(&decl.name, &resolved).await?;
        debug!("Created '{}' as {}", decl.name, created.id);

        // Record the physical id before stabilizing: a timeout below must
        // not orphan the resource. The record stays unstabilized until the
        // wait succeeds, so a failed wait leaves it marked for replacement.
        let mut record = ResourceRecord::new(
            &decl.name,
            &decl.kind,
            &created.id,
            &self.hasher.hash_decl(decl),
        );
        record.stabilized = false;
        record.properties = decl.properties.clone();
        record.depends_on = decl.dependency_names().map_err(|message| {
            StratusError::Config(ConfigError::InvalidReference {
                name: decl.name.clone(),
                message,
            })
        })?;
        record.outputs = created.outputs.clone();
        state.set_record(record);

        let settled = self
            .wait_ready(&decl.name, handler.as_ref(), &created.id)
            .await?;
        if let Some(record) = state.records.get_mut(&decl.name) {
            record.outputs = settled.outputs;
            record.stabilized = true;
            record.touch();
        }

        Ok(())
    }

    async fn apply_update(
        &self,
        action: &PlanAction,
        state: &mut DeploymentUnitState,
    ) -> Result<()> {
        let decl = self.declaration(&action.name)?;
        let handler = self.registry.get(&decl.kind)?;
        let resolved = self.resolve_properties(decl, state)?;

        let physical_id = state
            .get_record(&action.name)
            .map(|r| r.physical_id.clone())
            .ok_or_else(|| {
                StratusError::internal(format!(
                    "no state record for planned update of '{}'",
                    action.name
                ))
            })?;

        let updated = handler.update(&physical_id, &resolved).await?;
        let settled = self
            .wait_ready(&decl.name, handler.as_ref(), &updated.id)
            .await?;

        if let Some(record) = state.records.get_mut(&decl.name) {
            record.physical_id = settled.id;
            record.snapshot_hash = self.hasher.hash_decl(decl);
            record.properties = decl.properties.clone();
            record.depends_on = decl.dependency_names().unwrap_or_default();
            record.outputs = settled.outputs;
            record.touch();
        }

        Ok(())
    }

    async fn apply_delete(
        &self,
        action: &PlanAction,
        state: &mut DeploymentUnitState,
    ) -> Result<()> {
        let Some(record) = state.get_record(&action.name) else {
            debug!("'{}' has no state record, nothing to delete", action.name);
            return Ok(());
        };
        let physical_id = record.physical_id.clone();
        let handler = self.registry.get(&record.kind)?;

        handler.delete(&physical_id).await?;
        self.wait_deleted(&action.name, handler.as_ref(), &physical_id)
            .await?;

        // Tombstone commit: the record disappears only after the provider
        // confirmed the resource is gone.
        state.remove_record(&action.name);
        Ok(())
    }

    fn declaration(&self, name: &str) -> Result<&ResourceDecl> {
        self.decls.get(name).ok_or_else(|| {
            StratusError::internal(format!("no declaration for planned action on '{name}'"))
        })
    }

    /// Polls until the resource reports ready, returning its final view.
    async fn wait_ready(
        &self,
        name: &str,
        handler: &dyn ResourceHandler,
        physical_id: &str,
    ) -> Result<PhysicalResource> {
        let deadline = Instant::now() + self.stabilize_timeout;

        loop {
            let resource = handler.read(physical_id).await?.ok_or_else(|| {
                StratusError::Provider(ProviderError::ResourceNotFound {
                    physical_id: physical_id.to_string(),
                })
            })?;

            match resource.status {
                ResourceStatus::Ready => return Ok(resource),
                ResourceStatus::Failed => {
                    return Err(StratusError::Provider(ProviderError::ResourceFailed {
                        name: name.to_string(),
                        physical_id: physical_id.to_string(),
                    }));
                }
                ResourceStatus::Gone => {
                    return Err(StratusError::Provider(ProviderError::ResourceNotFound {
                        physical_id: physical_id.to_string(),
                    }));
                }
                ResourceStatus::Pending | ResourceStatus::Deleting => {}
            }

            if Instant::now() >= deadline {
                return Err(StratusError::Provider(ProviderError::StabilizeTimeout {
                    name: name.to_string(),
                    physical_id: physical_id.to_string(),
                }));
            }

            debug!("Waiting for '{name}' ({physical_id}) to stabilize");
            sleep(self.poll_interval).await;
        }
    }

    /// Polls until the provider reports the resource gone.
    async fn wait_deleted(
        &self,
        name: &str,
        handler: &dyn ResourceHandler,
        physical_id: &str,
    ) -> Result<()> {
        let deadline = Instant::now() + self.stabilize_timeout;

        loop {
            match handler.status(physical_id).await? {
                ResourceStatus::Gone => return Ok(()),
                ResourceStatus::Failed => {
                    return Err(StratusError::Provider(ProviderError::ResourceFailed {
                        name: name.to_string(),
                        physical_id: physical_id.to_string(),
                    }));
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(StratusError::Provider(ProviderError::StabilizeTimeout {
                    name: name.to_string(),
                    physical_id: physical_id.to_string(),
                }));
            }

            debug!("Waiting for '{name}' ({physical_id}) to be deleted");
            sleep(self.poll_interval).await;
        }
    }

    /// Resolves every reference token in a declaration's properties against
    /// committed state outputs and external parameters.
    fn resolve_properties(
        &self,
        decl: &ResourceDecl,
        state: &DeploymentUnitState,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        let mut resolved = serde_json::Map::new();
        for (key, value) in &decl.properties {
            resolved.insert(key.clone(), self.resolve_value(&decl.name, value, state)?);
        }
        Ok(resolved)
    }

    fn resolve_value(
        &self,
        name: &str,
        value: &serde_json::Value,
        state: &DeploymentUnitState,
    ) -> Result<serde_json::Value> {
        match value {
            serde_json::Value::String(s) => self.resolve_string(name, s, state),
            serde_json::Value::Array(items) => Ok(serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_value(name, item, state))
                    .collect::<Result<_>>()?,
            )),
            serde_json::Value::Object(map) => {
                let mut resolved = serde_json::Map::new();
                for (key, item) in map {
                    resolved.insert(key.clone(), self.resolve_value(name, item, state)?);
                }
                Ok(serde_json::Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(
        &self,
        name: &str,
        s: &str,
        state: &DeploymentUnitState,
    ) -> Result<serde_json::Value> {
        let refs = extract_references(s).map_err(|message| {
            StratusError::Config(ConfigError::InvalidReference {
                name: name.to_string(),
                message,
            })
        })?;

        if refs.is_empty() {
            return Ok(serde_json::Value::String(s.to_string()));
        }

        // A property that is exactly one token resolves to the referenced
        // value with its type intact. Anything else is string splicing.
        if refs.len() == 1 && s == refs[0].to_string() {
            return self.lookup(name, &refs[0], state);
        }

        let mut out = String::new();
        let mut rest = s;
        for reference in &refs {
            let token = reference.to_string();
            let Some(start) = rest.find(&token) else {
                continue;
            };
            out.push_str(&rest[..start]);
            let value = self.lookup(name, reference, state)?;
            out.push_str(&scalar_text(name, reference, &value)?);
            rest = &rest[start + token.len()..];
        }
        out.push_str(rest);

        Ok(serde_json::Value::String(out))
    }

    /// Resolves one reference token: parameters come from the configured
    /// parameter map, everything else from committed state outputs.
    fn lookup(
        &self,
        name: &str,
        reference: &Reference,
        state: &DeploymentUnitState,
    ) -> Result<serde_json::Value> {
        if reference.is_parameter() {
            return self
                .parameters
                .get(&reference.attribute)
                .cloned()
                .ok_or_else(|| unresolved(name, reference, "parameter is not defined"));
        }

        let record = state
            .get_record(&reference.target)
            .ok_or_else(|| unresolved(name, reference, "resource has not been provisioned"))?;

        record
            .output(&reference.attribute)
            .ok_or_else(|| unresolved(name, reference, "no such output attribute"))
    }
}

fn unresolved(name: &str, reference: &Reference, reason: &str) -> StratusError {
    StratusError::Apply(ApplyError::UnresolvedOutput {
        name: name.to_string(),
        target: reference.target.clone(),
        attribute: reference.attribute.clone(),
        reason: reason.to_string(),
    })
}

/// Renders a resolved value for splicing into a surrounding string.
fn scalar_text(
    name: &str,
    reference: &Reference,
    value: &serde_json::Value,
) -> Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(unresolved(
            name,
            reference,
            "composite value cannot be spliced into a string",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use crate::graph::DependencyGraph;
    use crate::planner::DiffEngine;
    use crate::state::LocalStateStore;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory provider shared across handlers of different kinds.
    #[derive(Default)]
    struct FakeProvider {
        resources: Mutex<HashMap<String, serde_json::Map<String, serde_json::Value>>>,
        counter: AtomicUsize,
        fail_creates: Mutex<HashSet<String>>,
        fail_stabilize: Mutex<HashSet<String>>,
        failed_ids: Mutex<HashSet<String>>,
    }

    impl FakeProvider {
        fn fail_create_of(&self, name: &str) {
            self.fail_creates
                .lock()
                .expect("lock")
                .insert(name.to_string());
        }

        /// The named resource's create succeeds but it never reaches a
        /// ready state.
        fn fail_stabilization_of(&self, name: &str) {
            self.fail_stabilize
                .lock()
                .expect("lock")
                .insert(name.to_string());
        }

        fn status_of(&self, physical_id: &str) -> ResourceStatus {
            if !self
                .resources
                .lock()
                .expect("lock")
                .contains_key(physical_id)
            {
                ResourceStatus::Gone
            } else if self.failed_ids.lock().expect("lock").contains(physical_id) {
                ResourceStatus::Failed
            } else {
                ResourceStatus::Ready
            }
        }

        fn clear_failures(&self) {
            self.fail_creates.lock().expect("lock").clear();
        }

        fn properties_of(&self, physical_id: &str) -> serde_json::Map<String, serde_json::Value> {
            self.resources
                .lock()
                .expect("lock")
                .get(physical_id)
                .cloned()
                .expect("resource should exist")
        }

        fn outputs_for(id: &str) -> serde_json::Map<String, serde_json::Value> {
            let mut outputs = serde_json::Map::new();
            outputs.insert(
                String::from("address"),
                serde_json::Value::String(format!("{id}.internal")),
            );
            outputs
        }
    }

    struct FakeHandler {
        kind: String,
        provider: Arc<FakeProvider>,
    }

    #[async_trait]
    impl ResourceHandler for FakeHandler {
        fn kind(&self) -> &str {
            &self.kind
        }

        async fn create(
            &self,
            name: &str,
            properties: &serde_json::Map<String, serde_json::Value>,
        ) -> Result<PhysicalResource> {
            if self.provider.fail_creates.lock().expect("lock").contains(name) {
                return Err(StratusError::Provider(ProviderError::api_error(
                    500,
                    format!("injected failure for {name}"),
                )));
            }

            let n = self.provider.counter.fetch_add(1, Ordering::SeqCst);
            let id = format!("{}-{n}", self.kind);
            self.provider
                .resources
                .lock()
                .expect("lock")
                .insert(id.clone(), properties.clone());
            if self
                .provider
                .fail_stabilize
                .lock()
                .expect("lock")
                .contains(name)
            {
                self.provider
                    .failed_ids
                    .lock()
                    .expect("lock")
                    .insert(id.clone());
            }

            Ok(PhysicalResource {
                outputs: FakeProvider::outputs_for(&id),
                id,
                status: ResourceStatus::Pending,
            })
        }

        async fn update(
            &self,
            physical_id: &str,
            properties: &serde_json::Map<String, serde_json::Value>,
        ) -> Result<PhysicalResource> {
            self.provider
                .resources
                .lock()
                .expect("lock")
                .insert(physical_id.to_string(), properties.clone());

            Ok(PhysicalResource {
                id: physical_id.to_string(),
                outputs: FakeProvider::outputs_for(physical_id),
                status: ResourceStatus::Ready,
            })
        }

        async fn delete(&self, physical_id: &str) -> Result<()> {
            self.provider
                .resources
                .lock()
                .expect("lock")
                .remove(physical_id);
            Ok(())
        }

        async fn read(&self, physical_id: &str) -> Result<Option<PhysicalResource>> {
            match self.provider.status_of(physical_id) {
                ResourceStatus::Gone => Ok(None),
                status => Ok(Some(PhysicalResource {
                    id: physical_id.to_string(),
                    outputs: FakeProvider::outputs_for(physical_id),
                    status,
                })),
            }
        }

        async fn status(&self, physical_id: &str) -> Result<ResourceStatus> {
            Ok(self.provider.status_of(physical_id))
        }
    }

    fn registry(provider: &Arc<FakeProvider>, kinds: &[&str]) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for kind in kinds {
            registry.register(Arc::new(FakeHandler {
                kind: (*kind).to_string(),
                provider: Arc::clone(provider),
            }));
        }
        registry
    }

    fn decl(name: &str, kind: &str, props: serde_json::Value) -> ResourceDecl {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "kind": kind,
            "properties": props,
        }))
        .expect("should deserialize")
    }

    fn decls(list: Vec<ResourceDecl>) -> BTreeMap<String, ResourceDecl> {
        list.into_iter().map(|d| (d.name.clone(), d)).collect()
    }

    fn topology() -> BTreeMap<String, ResourceDecl> {
        decls(vec![
            decl("vpc", "network", serde_json::json!({ "cidr": "10.0.0.0/16" })),
            decl(
                "db",
                "managed-database",
                serde_json::json!({ "engine": "postgres-17", "network": "${vpc.id}" }),
            ),
            decl(
                "svc",
                "compute-service",
                serde_json::json!({
                    "image": "n8nio/n8n:latest",
                    "network": "${vpc.id}",
                    "database": "postgres://${db.address}:5432/app",
                }),
            ),
        ])
    }

    fn make_plan(decls: &BTreeMap<String, ResourceDecl>, state: &DeploymentUnitState) -> Plan {
        let graph = DependencyGraph::build(decls).expect("graph");
        DiffEngine::new()
            .plan(decls, &graph, state, "hash")
            .expect("plan")
    }

    fn fast(executor: Executor<'_>) -> Executor<'_> {
        executor.with_timing(Duration::from_millis(1), Duration::from_secs(5))
    }

    fn store() -> (LocalStateStore, TempDir) {
        let temp = TempDir::new().expect("temp dir");
        (LocalStateStore::with_base_dir(temp.path()), temp)
    }

    #[tokio::test]
    async fn test_apply_resolves_references_and_records_state() {
        let provider = Arc::new(FakeProvider::default());
        let registry = registry(
            &provider,
            &["network", "managed-database", "compute-service"],
        );
        let decls = topology();
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let plan = make_plan(&decls, &state);
        let executor = fast(Executor::new(&registry, &decls, &params));
        let report = executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        assert_eq!(report.status, RunStatus::FullyApplied);
        assert_eq!(state.records.len(), 3);

        let vpc_id = state.get_record("vpc").expect("vpc").physical_id.clone();
        let db_id = state.get_record("db").expect("db").physical_id.clone();
        let svc_id = state.get_record("svc").expect("svc").physical_id.clone();

        // The provider received resolved values, not tokens.
        let svc_props = provider.properties_of(&svc_id);
        assert_eq!(
            svc_props.get("network"),
            Some(&serde_json::Value::String(vpc_id))
        );
        assert_eq!(
            svc_props.get("database"),
            Some(&serde_json::Value::String(format!(
                "postgres://{db_id}.internal:5432/app"
            )))
        );
    }

    #[tokio::test]
    async fn test_reapply_is_idempotent() {
        let provider = Arc::new(FakeProvider::default());
        let registry = registry(
            &provider,
            &["network", "managed-database", "compute-service"],
        );
        let decls = topology();
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let executor = fast(Executor::new(&registry, &decls, &params));
        let plan = make_plan(&decls, &state);
        executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        let replan = make_plan(&decls, &state);
        assert!(replan.is_empty());

        let report = executor
            .execute(&replan, &mut state, &store)
            .await
            .expect("execute");
        assert_eq!(report.status, RunStatus::NoOp);
        assert_eq!(provider.counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_halts_and_skips_remaining() {
        let provider = Arc::new(FakeProvider::default());
        provider.fail_create_of("b");
        let registry = registry(&provider, &["network"]);
        let decls = decls(
            ["a", "b", "c", "d", "e"]
                .iter()
                .map(|n| decl(n, "network", serde_json::json!({})))
                .collect(),
        );
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let plan = make_plan(&decls, &state);
        let executor = fast(Executor::new(&registry, &decls, &params));
        let report = executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        assert_eq!(report.status, RunStatus::PartiallyApplied);
        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 3);

        assert!(matches!(report.results[0].outcome, ActionOutcome::Succeeded));
        assert!(matches!(
            report.results[1].outcome,
            ActionOutcome::Failed { .. }
        ));
        for result in &report.results[2..] {
            assert!(matches!(result.outcome, ActionOutcome::Skipped { .. }));
        }

        // Only the successful action was committed.
        assert_eq!(state.record_names(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_rerun_after_failure_resumes() {
        let provider = Arc::new(FakeProvider::default());
        provider.fail_create_of("b");
        let registry = registry(&provider, &["network"]);
        let decls = decls(
            ["a", "b", "c"]
                .iter()
                .map(|n| decl(n, "network", serde_json::json!({})))
                .collect(),
        );
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let executor = fast(Executor::new(&registry, &decls, &params));
        let plan = make_plan(&decls, &state);
        executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        provider.clear_failures();

        // The re-run plans only what did not apply.
        let replan = make_plan(&decls, &state);
        let names: Vec<&str> = replan.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(replan.unchanged, vec!["a"]);

        let report = executor
            .execute(&replan, &mut state, &store)
            .await
            .expect("execute");
        assert_eq!(report.status, RunStatus::FullyApplied);
        assert_eq!(state.records.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_stabilization_is_replanned() {
        let provider = Arc::new(FakeProvider::default());
        provider.fail_stabilization_of("vpc");
        let registry = registry(&provider, &["network"]);
        let decls = decls(vec![decl(
            "vpc",
            "network",
            serde_json::json!({ "cidr": "10.0.0.0/16" }),
        )]);
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let plan = make_plan(&decls, &state);
        let executor = fast(Executor::new(&registry, &decls, &params));
        let report = executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.failed_count(), 1);

        // The physical id is committed so nothing is orphaned, but the
        // record is not treated as applied.
        let record = state.get_record("vpc").expect("vpc");
        assert!(!record.physical_id.is_empty());
        assert!(!record.stabilized);

        // The re-run replaces the half-created resource instead of
        // silently dropping it from the plan.
        let replan = make_plan(&decls, &state);
        let actions: Vec<(ActionType, &str)> = replan
            .actions
            .iter()
            .map(|a| (a.action_type, a.name.as_str()))
            .collect();
        assert_eq!(
            actions,
            vec![(ActionType::Delete, "vpc"), (ActionType::Create, "vpc")]
        );
        assert!(replan.unchanged.is_empty());
    }

    #[tokio::test]
    async fn test_lease_refreshed_between_actions() {
        let provider = Arc::new(FakeProvider::default());
        let registry = registry(
            &provider,
            &["network", "managed-database", "compute-service"],
        );
        let decls = topology();
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let lock = store.acquire_lock("run-1").await.expect("acquire");
        let plan = make_plan(&decls, &state);
        let executor = fast(Executor::new(&registry, &decls, &params)).with_lock(&lock.lock_id);
        let report = executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        assert_eq!(report.status, RunStatus::FullyApplied);
        let refreshed = store
            .get_lock_info()
            .await
            .expect("lock info")
            .expect("lease should still be held");
        assert!(refreshed.expires_at > lock.expires_at);
    }

    #[tokio::test]
    async fn test_execute_fails_when_lease_is_lost() {
        let provider = Arc::new(FakeProvider::default());
        let registry = registry(&provider, &["network"]);
        let decls = decls(vec![decl("vpc", "network", serde_json::json!({}))]);
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let lock = store.acquire_lock("run-1").await.expect("acquire");
        store.release_lock(&lock.lock_id).await.expect("release");

        let plan = make_plan(&decls, &state);
        let executor = fast(Executor::new(&registry, &decls, &params)).with_lock(&lock.lock_id);
        let error = executor
            .execute(&plan, &mut state, &store)
            .await
            .expect_err("should fail");

        assert!(matches!(
            error,
            StratusError::State(StateError::LockFailed { .. })
        ));
        assert!(state.records.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_deletes_everything_in_reverse_order() {
        let provider = Arc::new(FakeProvider::default());
        let registry = registry(
            &provider,
            &["network", "managed-database", "compute-service"],
        );
        let decls = topology();
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let executor = fast(Executor::new(&registry, &decls, &params));
        let plan = make_plan(&decls, &state);
        executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        let empty = BTreeMap::new();
        let teardown = make_plan(&empty, &state);
        let names: Vec<&str> = teardown.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["svc", "db", "vpc"]);

        let executor = fast(Executor::new(&registry, &empty, &params));
        let report = executor
            .execute(&teardown, &mut state, &store)
            .await
            .expect("execute");

        assert_eq!(report.status, RunStatus::FullyApplied);
        assert!(state.records.is_empty());
        assert!(provider.resources.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_undefined_parameter_fails_the_action() {
        let provider = Arc::new(FakeProvider::default());
        let registry = registry(&provider, &["load-balancer-listener"]);
        let decls = decls(vec![decl(
            "https",
            "load-balancer-listener",
            serde_json::json!({ "certificate": "${param.certificate_arn}" }),
        )]);
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let plan = make_plan(&decls, &state);
        let executor = fast(Executor::new(&registry, &decls, &params));
        let report = executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        assert_eq!(report.status, RunStatus::Failed);
        assert!(state.records.is_empty());
    }

    #[tokio::test]
    async fn test_whole_token_reference_keeps_value_type() {
        let provider = Arc::new(FakeProvider::default());
        let registry = registry(&provider, &["network"]);
        let decls = decls(vec![decl(
            "vpc",
            "network",
            serde_json::json!({ "max_azs": "${param.az_count}" }),
        )]);
        let params: BTreeMap<String, serde_json::Value> =
            [(String::from("az_count"), serde_json::json!(2))]
                .into_iter()
                .collect();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let plan = make_plan(&decls, &state);
        let executor = fast(Executor::new(&registry, &decls, &params));
        executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        let vpc_id = state.get_record("vpc").expect("vpc").physical_id.clone();
        let props = provider.properties_of(&vpc_id);
        assert_eq!(props.get("max_azs"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_all_actions() {
        let provider = Arc::new(FakeProvider::default());
        let registry = registry(&provider, &["network"]);
        let decls = decls(vec![decl("vpc", "network", serde_json::json!({}))]);
        let params = BTreeMap::new();
        let (store, _temp) = store();
        let mut state = DeploymentUnitState::new("test", "dev");

        let plan = make_plan(&decls, &state);
        let executor = fast(Executor::new(&registry, &decls, &params));
        executor.cancel_flag().store(true, Ordering::SeqCst);

        let report = executor
            .execute(&plan, &mut state, &store)
            .await
            .expect("execute");

        assert!(report
            .results
            .iter()
            .all(|r| matches!(r.outcome, ActionOutcome::Skipped { .. })));
        assert!(state.records.is_empty());

        let entry = state.history.last().expect("history entry");
        assert_eq!(entry.status, RunStatus::Failed);
        assert!(entry
            .error
            .as_deref()
            .is_some_and(|e| e.contains("cancelled")));
    }
}
