//! Plan generation: diffing declarations against provisioned state.
//!
//! The engine classifies every declaration as create, update, replace, or
//! no-op, cascades replacements through dependents, and emits a single
//! ordered action sequence: teardown first (reverse dependency order), then
//! builds (forward dependency order). Replacements appear as a delete half
//! in the teardown phase and a create half in the build phase.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::config::{DeclHasher, ResourceDecl};
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::provider::schema;
use crate::state::DeploymentUnitState;

use super::plan::{ActionType, Plan, PlanAction, PropertyChange};

/// What planning decided for one logical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Create,
    Update,
    Replace,
    Noop,
}

#[derive(Debug, Clone)]
struct Classification {
    decision: Decision,
    reason: String,
    changes: Vec<PropertyChange>,
}

/// Plan generator.
#[derive(Debug, Default)]
pub struct DiffEngine {
    hasher: DeclHasher,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: DeclHasher::new(),
        }
    }

    /// Generates a plan reconciling `state` with `decls`.
    ///
    /// The action sequence is deterministic for a given input: ties in the
    /// dependency order break lexicographically.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown ordering cannot be derived from the
    /// recorded state (a cycle in recorded `depends_on` edges).
    pub fn plan(
        &self,
        decls: &BTreeMap<String, ResourceDecl>,
        graph: &DependencyGraph,
        state: &DeploymentUnitState,
        config_hash: &str,
    ) -> Result<Plan> {
        let mut classifications: BTreeMap<String, Classification> = BTreeMap::new();

        // Classify in dependency order so replacement cascades see their
        // dependencies' decisions first.
        for name in graph.topo_order() {
            let Some(decl) = decls.get(name) else {
                continue;
            };
            let mut classification = self.classify(decl, state);

            if classification.decision != Decision::Create {
                self.cascade(decl, graph, &classifications, &mut classification);
            }

            debug!(
                "Classified '{name}' as {:?}: {}",
                classification.decision, classification.reason
            );
            classifications.insert(name.clone(), classification);
        }

        // Resources recorded in state but no longer declared.
        let removed: BTreeSet<&str> = state
            .records
            .keys()
            .filter(|name| !decls.contains_key(*name))
            .map(String::as_str)
            .collect();

        let replaced: BTreeSet<&str> = classifications
            .iter()
            .filter(|(_, c)| c.decision == Decision::Replace)
            .map(|(name, _)| name.as_str())
            .collect();

        let mut actions = Vec::new();

        // Teardown phase: deletes in reverse dependency order, derived from
        // the edges recorded in state (the declarations may be gone).
        for name in Self::teardown_order(state, &removed, &replaced)? {
            let Some(record) = state.get_record(&name) else {
                continue;
            };
            let part_of_replacement = replaced.contains(name.as_str());
            let reason = if part_of_replacement {
                classifications
                    .get(&name)
                    .map_or_else(String::new, |c| c.reason.clone())
            } else {
                String::from("removed from configuration")
            };
            actions.push(PlanAction {
                action_type: ActionType::Delete,
                name: name.clone(),
                kind: record.kind.clone(),
                reason,
                physical_id: Some(record.physical_id.clone()),
                changes: vec![],
                part_of_replacement,
            });
        }

        // Build phase: creates and updates in forward dependency order.
        let mut unchanged = Vec::new();
        for name in graph.topo_order() {
            let Some(classification) = classifications.get(name) else {
                continue;
            };
            let Some(decl) = decls.get(name) else {
                continue;
            };
            let record = state.get_record(name);

            match classification.decision {
                Decision::Noop => unchanged.push(name.clone()),
                Decision::Create | Decision::Replace => {
                    actions.push(PlanAction {
                        action_type: ActionType::Create,
                        name: name.clone(),
                        kind: decl.kind.clone(),
                        reason: classification.reason.clone(),
                        physical_id: None,
                        changes: classification.changes.clone(),
                        part_of_replacement: classification.decision == Decision::Replace,
                    });
                }
                Decision::Update => {
                    actions.push(PlanAction {
                        action_type: ActionType::Update,
                        name: name.clone(),
                        kind: decl.kind.clone(),
                        reason: classification.reason.clone(),
                        physical_id: record.map(|r| r.physical_id.clone()),
                        changes: classification.changes.clone(),
                        part_of_replacement: false,
                    });
                }
            }
        }

        let plan = Plan {
            created_at: chrono::Utc::now(),
            config_hash: config_hash.to_string(),
            actions,
            unchanged,
        };

        info!(
            "Plan generated: {} create, {} update, {} delete, {} unchanged",
            plan.create_count(),
            plan.update_count(),
            plan.delete_count(),
            plan.unchanged.len()
        );

        Ok(plan)
    }

    /// Classifies a single declaration against its state record.
    fn classify(&self, decl: &ResourceDecl, state: &DeploymentUnitState) -> Classification {
        let Some(record) = state.get_record(&decl.name) else {
            return Classification {
                decision: Decision::Create,
                reason: String::from("not yet provisioned"),
                changes: vec![],
            };
        };

        // A record committed before its stabilization wait failed is not
        // applied, whatever its snapshot hash says.
        if !record.stabilized {
            return Classification {
                decision: Decision::Replace,
                reason: String::from("previous apply did not stabilize"),
                changes: vec![],
            };
        }

        if record.kind != decl.kind {
            return Classification {
                decision: Decision::Replace,
                reason: format!("kind changed from '{}' to '{}'", record.kind, decl.kind),
                changes: vec![PropertyChange {
                    key: String::from("kind"),
                    old: Some(serde_json::Value::String(record.kind.clone())),
                    new: Some(serde_json::Value::String(decl.kind.clone())),
                }],
            };
        }

        if record.snapshot_hash == self.hasher.hash_decl(decl) {
            return Classification {
                decision: Decision::Noop,
                reason: String::new(),
                changes: vec![],
            };
        }

        let changes = property_changes(&record.properties, &decl.properties);
        let immutable: Vec<&str> = changes
            .iter()
            .filter(|c| schema::is_immutable(&decl.kind, &c.key))
            .map(|c| c.key.as_str())
            .collect();

        if immutable.is_empty() {
            Classification {
                decision: Decision::Update,
                reason: if changes.is_empty() {
                    String::from("ordering dependencies changed")
                } else {
                    String::from("properties changed")
                },
                changes,
            }
        } else {
            Classification {
                decision: Decision::Replace,
                reason: format!("immutable properties changed: {}", immutable.join(", ")),
                changes,
            }
        }
    }

    /// Escalates a classification when one of its dependencies is being
    /// replaced. A reference under an immutable key forces a replacement of
    /// the dependent too; any other reference forces at least an update so
    /// the dependent is re-pointed at the new physical resource.
    fn cascade(
        &self,
        decl: &ResourceDecl,
        graph: &DependencyGraph,
        decided: &BTreeMap<String, Classification>,
        classification: &mut Classification,
    ) {
        for dep in graph.dependencies_of(&decl.name) {
            let replaced = decided
                .get(dep)
                .is_some_and(|c| c.decision == Decision::Replace);
            if !replaced {
                continue;
            }

            let keys = decl.keys_referencing(dep);
            if keys.is_empty() {
                continue;
            }

            let immutable: Vec<&str> = keys
                .iter()
                .filter(|key| schema::is_immutable(&decl.kind, key))
                .copied()
                .collect();

            if !immutable.is_empty() {
                classification.decision = Decision::Replace;
                classification.reason = format!(
                    "replacement of '{dep}' invalidates immutable properties: {}",
                    immutable.join(", ")
                );
            } else if classification.decision == Decision::Noop {
                classification.decision = Decision::Update;
                classification.reason = format!("dependency '{dep}' was replaced");
            }
        }
    }

    /// Computes teardown order for deletes: reverse dependency order over
    /// the edges recorded in state, restricted to the teardown set.
    fn teardown_order(
        state: &DeploymentUnitState,
        removed: &BTreeSet<&str>,
        replaced: &BTreeSet<&str>,
    ) -> Result<Vec<String>> {
        let edges: BTreeMap<String, BTreeSet<String>> = state
            .records
            .values()
            .map(|record| {
                (
                    record.name.clone(),
                    record.depends_on.iter().cloned().collect(),
                )
            })
            .collect();

        let state_graph = DependencyGraph::from_edges(edges)?;

        Ok(state_graph
            .topo_order()
            .iter()
            .rev()
            .filter(|name| {
                removed.contains(name.as_str()) || replaced.contains(name.as_str())
            })
            .cloned()
            .collect())
    }
}

/// Computes a key-by-key diff between two property maps.
fn property_changes(
    old: &serde_json::Map<String, serde_json::Value>,
    new: &serde_json::Map<String, serde_json::Value>,
) -> Vec<PropertyChange> {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

    keys.into_iter()
        .filter(|key| old.get(*key) != new.get(*key))
        .map(|key| PropertyChange {
            key: key.clone(),
            old: old.get(key).cloned(),
            new: new.get(key).cloned(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResourceRecord;

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

    /// Builds a record as if `decl` had been applied successfully.
    fn applied(decl: &ResourceDecl, physical_id: &str) -> ResourceRecord {
        let hasher = DeclHasher::new();
        let mut record = ResourceRecord::new(
            &decl.name,
            &decl.kind,
            physical_id,
            &hasher.hash_decl(decl),
        );
        record.properties = decl.properties.clone();
        record.depends_on = decl.dependency_names().expect("deps");
        record
    }

    fn applied_state(decls: &BTreeMap<String, ResourceDecl>) -> DeploymentUnitState {
        let mut state = DeploymentUnitState::new("test", "dev");
        for (i, decl) in decls.values().enumerate() {
            state.set_record(applied(decl, &format!("{}-{i}", decl.kind)));
        }
        state
    }

    fn action_names(plan: &Plan) -> Vec<(ActionType, &str)> {
        plan.actions
            .iter()
            .map(|a| (a.action_type, a.name.as_str()))
            .collect()
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
                    "database": "${db.address}",
                }),
            ),
        ])
    }

    #[test]
    fn test_fresh_plan_is_all_creates_in_dependency_order() {
        let decls = topology();
        let graph = DependencyGraph::build(&decls).expect("graph");
        let state = DeploymentUnitState::new("test", "dev");

        let plan = DiffEngine::new()
            .plan(&decls, &graph, &state, "hash")
            .expect("plan");

        assert_eq!(
            action_names(&plan),
            vec![
                (ActionType::Create, "vpc"),
                (ActionType::Create, "db"),
                (ActionType::Create, "svc"),
            ]
        );
        assert!(plan.unchanged.is_empty());
    }

    #[test]
    fn test_replan_of_applied_state_is_noop() {
        let decls = topology();
        let graph = DependencyGraph::build(&decls).expect("graph");
        let state = applied_state(&decls);

        let plan = DiffEngine::new()
            .plan(&decls, &graph, &state, "hash")
            .expect("plan");

        assert!(plan.is_empty());
        assert_eq!(plan.unchanged.len(), 3);
    }

    #[test]
    fn test_mutable_change_plans_update_only() {
        let mut decls = topology();
        let graph = DependencyGraph::build(&decls).expect("graph");
        let state = applied_state(&decls);

        let svc = decls.get_mut("svc").expect("svc");
        svc.properties.insert(
            String::from("image"),
            serde_json::Value::String(String::from("n8nio/n8n:1.2")),
        );

        let plan = DiffEngine::new()
            .plan(&decls, &graph, &state, "hash")
            .expect("plan");

        assert_eq!(action_names(&plan), vec![(ActionType::Update, "svc")]);
        let action = &plan.actions[0];
        assert_eq!(action.changes.len(), 1);
        assert_eq!(action.changes[0].key, "image");
        assert!(!action.part_of_replacement);
    }

    #[test]
    fn test_immutable_change_plans_replacement() {
        let mut decls = decls(vec![decl(
            "vpc",
            "network",
            serde_json::json!({ "cidr": "10.0.0.0/16" }),
        )]);
        let state = applied_state(&decls);

        let vpc = decls.get_mut("vpc").expect("vpc");
        vpc.properties.insert(
            String::from("cidr"),
            serde_json::Value::String(String::from("10.1.0.0/16")),
        );
        let graph = DependencyGraph::build(&decls).expect("graph");

        let plan = DiffEngine::new()
            .plan(&decls, &graph, &state, "hash")
            .expect("plan");

        assert_eq!(
            action_names(&plan),
            vec![(ActionType::Delete, "vpc"), (ActionType::Create, "vpc")]
        );
        assert!(plan.actions.iter().all(|a| a.part_of_replacement));
    }

    #[test]
    fn test_replacement_cascades_through_immutable_references() {
        // sg references vpc under its immutable "network" key; replacing
        // vpc must replace sg too, with deletes in reverse order.
        let mut decls = decls(vec![
            decl("vpc", "network", serde_json::json!({ "cidr": "10.0.0.0/16" })),
            decl(
                "sg",
                "security-group",
                serde_json::json!({ "network": "${vpc.id}" }),
            ),
        ]);
        let state = applied_state(&decls);

        let vpc = decls.get_mut("vpc").expect("vpc");
        vpc.properties.insert(
            String::from("cidr"),
            serde_json::Value::String(String::from("10.1.0.0/16")),
        );
        let graph = DependencyGraph::build(&decls).expect("graph");

        let plan = DiffEngine::new()
            .plan(&decls, &graph, &state, "hash")
            .expect("plan");

        assert_eq!(
            action_names(&plan),
            vec![
                (ActionType::Delete, "sg"),
                (ActionType::Delete, "vpc"),
                (ActionType::Create, "vpc"),
                (ActionType::Create, "sg"),
            ]
        );
    }

    #[test]
    fn test_replacement_repoints_mutable_dependents() {
        // svc references db under the mutable "database" key; replacing db
        // downgrades to an update of svc, not a replacement.
        let mut decls = topology();
        let state = applied_state(&decls);

        let db = decls.get_mut("db").expect("db");
        db.properties.insert(
            String::from("engine"),
            serde_json::Value::String(String::from("postgres-18")),
        );
        let graph = DependencyGraph::build(&decls).expect("graph");

        let plan = DiffEngine::new()
            .plan(&decls, &graph, &state, "hash")
            .expect("plan");

        assert_eq!(
            action_names(&plan),
            vec![
                (ActionType::Delete, "db"),
                (ActionType::Create, "db"),
                (ActionType::Update, "svc"),
            ]
        );
    }

    #[test]
    fn test_unstabilized_record_is_replaced() {
        let decls = decls(vec![decl(
            "vpc",
            "network",
            serde_json::json!({ "cidr": "10.0.0.0/16" }),
        )]);
        let graph = DependencyGraph::build(&decls).expect("graph");
        let mut state = applied_state(&decls);
        state.records.get_mut("vpc").expect("vpc").stabilized = false;

        let plan = DiffEngine::new()
            .plan(&decls, &graph, &state, "hash")
            .expect("plan");

        assert_eq!(
            action_names(&plan),
            vec![(ActionType::Delete, "vpc"), (ActionType::Create, "vpc")]
        );
        assert!(plan.unchanged.is_empty());
    }

    #[test]
    fn test_removed_resources_deleted_in_reverse_order() {
        let decls_applied = topology();
        let state = applied_state(&decls_applied);

        let empty = BTreeMap::new();
        let graph = DependencyGraph::build(&empty).expect("graph");

        let plan = DiffEngine::new()
            .plan(&empty, &graph, &state, "hash")
            .expect("plan");

        assert_eq!(
            action_names(&plan),
            vec![
                (ActionType::Delete, "svc"),
                (ActionType::Delete, "db"),
                (ActionType::Delete, "vpc"),
            ]
        );
        assert!(plan.actions.iter().all(|a| !a.part_of_replacement));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let mut decls = topology();
        let state = applied_state(&decls);
        let svc = decls.get_mut("svc").expect("svc");
        svc.properties.insert(
            String::from("image"),
            serde_json::Value::String(String::from("n8nio/n8n:1.2")),
        );
        let graph = DependencyGraph::build(&decls).expect("graph");

        let engine = DiffEngine::new();
        let first = engine.plan(&decls, &graph, &state, "hash").expect("plan");
        let second = engine.plan(&decls, &graph, &state, "hash").expect("plan");

        assert_eq!(action_names(&first), action_names(&second));
        assert_eq!(first.unchanged, second.unchanged);
    }
}
