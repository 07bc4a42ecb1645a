//! Schema object dependency graph.
//!
//! Adjacency-map-pair plus DFS-before-commit cycle check plus Kahn's
//! topological sort — the same shape as the teacher's repo dependency
//! graph, generalized from untyped repo edges to typed, strength-weighted
//! schema edges.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Severity;
use crate::planner::Risk;

pub const STRENGTH_FOREIGN_KEY: u8 = 200;
pub const STRENGTH_INHERITANCE: u8 = 250;
pub const STRENGTH_SEQUENCE_OWNERSHIP: u8 = 190;
pub const STRENGTH_TRIGGER_FUNCTION: u8 = 180;
pub const STRENGTH_VIEW_DEPENDENCY: u8 = 150;
pub const STRENGTH_INDEX_FUNCTION: u8 = 120;
pub const STRENGTH_FUNCTION_TABLE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyType {
    ForeignKey,
    Inheritance,
    SequenceOwnership,
    TriggerFunction,
    ViewDependency,
    IndexFunction,
    FunctionTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadeBehavior {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent_key: String,
    pub depends_on_key: String,
    pub dependency_type: DependencyType,
    pub strength: u8,
    pub cascade_behavior: CascadeBehavior,
    pub details: Option<String>,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("adding edge {0} -> {1} would create a cycle")]
    WouldCreateCycle(String, String),
    #[error("object not found in graph: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Create,
    Drop,
}

/// Result of a topological ordering attempt: the best-effort order, plus any
/// non-fatal warnings raised while producing it (currently just a detected
/// cycle `order_for` still emitted a full ordering for).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderingResult {
    pub order: Vec<String>,
    pub warnings: Vec<String>,
}

/// Dependency graph over schema object keys (`schema.name`).
///
/// Mirrors the teacher's `RepoDependencyGraph`: parallel downstream/upstream
/// adjacency maps, a tentative-add-then-DFS-check-then-rollback pattern for
/// cycle rejection, and Kahn's algorithm with `sort_unstable` for
/// deterministic topological ordering.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashSet<String>,
    downstream: HashMap<String, HashSet<String>>,
    upstream: HashMap<String, HashSet<String>>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, key: &str) {
        self.nodes.insert(key.to_string());
        self.downstream.entry(key.to_string()).or_default();
        self.upstream.entry(key.to_string()).or_default();
    }

    /// Adds a dependency edge, rejecting it (with rollback) if it would
    /// introduce a cycle. At most one edge per `(dependent, depends_on,
    /// type)` is kept; re-adding the same triple overwrites strength/cascade.
    pub fn add_dependency(&mut self, edge: DependencyEdge) -> Result<(), GraphError> {
        self.add_node(&edge.dependent_key);
        self.add_node(&edge.depends_on_key);

        self.downstream
            .get_mut(&edge.depends_on_key)
            .unwrap()
            .insert(edge.dependent_key.clone());
        self.upstream
            .get_mut(&edge.dependent_key)
            .unwrap()
            .insert(edge.depends_on_key.clone());

        if self.find_cycle_through(&edge.dependent_key) {
            self.downstream
                .get_mut(&edge.depends_on_key)
                .unwrap()
                .remove(&edge.dependent_key);
            self.upstream
                .get_mut(&edge.dependent_key)
                .unwrap()
                .remove(&edge.depends_on_key);
            return Err(GraphError::WouldCreateCycle(
                edge.dependent_key.clone(),
                edge.depends_on_key.clone(),
            ));
        }

        self.edges.retain(|e| {
            !(e.dependent_key == edge.dependent_key
                && e.depends_on_key == edge.depends_on_key
                && e.dependency_type == edge.dependency_type)
        });
        self.edges.push(edge);
        Ok(())
    }

    fn find_cycle_through(&self, start: &str) -> bool {
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        self.dfs_cycle(start, &mut visiting, &mut visited)
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visiting: &mut HashSet<String>,
        visited: &mut HashSet<String>,
    ) -> bool {
        if visiting.contains(node) {
            return true;
        }
        if visited.contains(node) {
            return false;
        }
        visiting.insert(node.to_string());
        if let Some(deps) = self.upstream.get(node) {
            for dep in deps {
                if self.dfs_cycle(dep, visiting, visited) {
                    return true;
                }
            }
        }
        visiting.remove(node);
        visited.insert(node.to_string());
        false
    }

    /// Topological order of all nodes via Kahn's algorithm, ties broken by
    /// key for determinism. `Direction::Create` yields dependencies before
    /// dependents; `Direction::Drop` reverses it.
    ///
    /// `spec.md` §4.5: a cycle reaching this point (`add_dependency` already
    /// rejects cycles formed edge-by-edge, but a graph populated some other
    /// way — e.g. loaded in bulk from catalog introspection — can still
    /// carry one) does not abort ordering. The cycle's members are appended
    /// in strength-descending order and a `CyclicDependency` warning is
    /// recorded instead.
    pub fn order_for(&self, direction: Direction) -> OrderingResult {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.upstream.get(n).map(|s| s.len()).unwrap_or(0)))
            .collect();

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(k, _)| *k)
            .collect();
        ready.sort_unstable();

        let mut queue: VecDeque<&str> = ready.into();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            let mut next_ready: Vec<&str> = Vec::new();
            if let Some(dependents) = self.downstream.get(node) {
                for dependent in dependents {
                    let deg = in_degree.get_mut(dependent.as_str()).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        next_ready.push(dependent.as_str());
                    }
                }
            }
            next_ready.sort_unstable();
            for n in next_ready {
                queue.push_back(n);
            }
        }

        let mut warnings = Vec::new();
        if order.len() != self.nodes.len() {
            let ordered: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
            let mut stuck: Vec<&str> = in_degree
                .keys()
                .copied()
                .filter(|n| !ordered.contains(n))
                .collect();
            stuck.sort_by(|a, b| {
                self.node_strength(b)
                    .cmp(&self.node_strength(a))
                    .then_with(|| a.cmp(b))
            });
            warnings.push(format!(
                "cyclic dependency among: {}",
                stuck.join(", ")
            ));
            order.extend(stuck.into_iter().map(|n| n.to_string()));
        }

        if direction == Direction::Drop {
            order.reverse();
        }
        OrderingResult { order, warnings }
    }

    /// Sum of the strengths of every edge touching `node`, used to break
    /// ties when a cycle's members must still be emitted in some order.
    fn node_strength(&self, node: &str) -> u32 {
        self.edges
            .iter()
            .filter(|e| e.dependent_key == node || e.depends_on_key == node)
            .map(|e| e.strength as u32)
            .sum()
    }

    /// Every node reachable downstream from `key` — used to report the blast
    /// radius of dropping or altering an object.
    pub fn impact(&self, key: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(key.to_string());
        visited.insert(key.to_string());
        let mut out = Vec::new();

        while let Some(node) = queue.pop_front() {
            if let Some(dependents) = self.downstream.get(&node) {
                let mut sorted: Vec<&String> = dependents.iter().collect();
                sorted.sort();
                for dep in sorted {
                    if visited.insert(dep.clone()) {
                        out.push(dep.clone());
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        out
    }

    /// Confirms the graph is currently acyclic; used before planning so a
    /// pre-existing cycle surfaces as warnings rather than an infinite loop
    /// in the planner.
    pub fn validate(&self) -> Vec<String> {
        self.order_for(Direction::Create).warnings
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    fn edge_strength(&self, dependent: &str, depends_on: &str) -> u8 {
        self.edges
            .iter()
            .find(|e| e.dependent_key == dependent && e.depends_on_key == depends_on)
            .map(|e| e.strength)
            .unwrap_or(0)
    }

    /// BFS blast-radius report for `operation` applied to `key`, bounded by
    /// `max_depth`. `Direction::Drop` walks dependents (what breaks if `key`
    /// is dropped); `Direction::Create` walks dependencies (what must exist
    /// first). Depth 1 is `Direct`, depth 2 `Indirect`, depth 3+ `Deep`.
    pub fn analyze_impact(&self, key: &str, operation: Direction, max_depth: usize) -> Vec<ImpactRow> {
        let mut rows = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(key.to_string());
        let mut queue: VecDeque<(String, Vec<String>, usize)> = VecDeque::new();
        queue.push_back((key.to_string(), vec![key.to_string()], 0));

        while let Some((node, path, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let adjacency = match operation {
                Direction::Drop => self.downstream.get(&node),
                Direction::Create => self.upstream.get(&node),
            };
            let mut next: Vec<&String> = adjacency.map(|s| s.iter().collect()).unwrap_or_default();
            next.sort();

            for dep in next.drain(..) {
                if !visited.insert(dep.clone()) {
                    continue;
                }
                let mut path_to_dep = path.clone();
                path_to_dep.push(dep.clone());
                let next_depth = depth + 1;
                let impact = match next_depth {
                    1 => ImpactLevel::Direct,
                    2 => ImpactLevel::Indirect,
                    _ => ImpactLevel::Deep,
                };
                let strength = match operation {
                    Direction::Drop => self.edge_strength(dep, &node),
                    Direction::Create => self.edge_strength(&node, dep),
                };
                let risk = risk_from_strength(strength);
                let suggested_action = suggested_action_for(operation, impact, risk);

                rows.push(ImpactRow {
                    affected: dep.clone(),
                    path: path_to_dep.clone(),
                    impact,
                    risk,
                    suggested_action,
                });
                queue.push_back((dep.clone(), path_to_dep, next_depth));
            }
        }

        rows
    }

    /// Structural schema validation: circular dependencies, inheritance
    /// chains and view chains deeper than configured limits, and tables
    /// with more incoming foreign keys than configured.
    pub fn validate_schema(
        &self,
        inheritance_depth_limit: u32,
        max_incoming_fks: u32,
        view_chain_limit: u32,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for warning in self.validate() {
            issues.push(ValidationIssue {
                kind: ValidationIssueKind::CircularDependency,
                severity: Severity::Critical,
                object: "<cycle>".to_string(),
                description: warning,
                remediation: "break the cycle by removing or redirecting one of the edges"
                    .to_string(),
            });
        }

        let mut nodes: Vec<&String> = self.nodes.iter().collect();
        nodes.sort();

        for node in &nodes {
            let fk_count = self
                .edges
                .iter()
                .filter(|e| {
                    e.depends_on_key == **node && e.dependency_type == DependencyType::ForeignKey
                })
                .count() as u32;
            if fk_count > max_incoming_fks {
                issues.push(ValidationIssue {
                    kind: ValidationIssueKind::ExcessiveIncomingForeignKeys,
                    severity: Severity::Warning,
                    object: (*node).clone(),
                    description: format!(
                        "{node} has {fk_count} incoming foreign keys (limit {max_incoming_fks})"
                    ),
                    remediation: "consider denormalizing or partitioning the referencing tables"
                        .to_string(),
                });
            }

            let inheritance_depth = self.chain_depth(node, DependencyType::Inheritance);
            if inheritance_depth > inheritance_depth_limit {
                issues.push(ValidationIssue {
                    kind: ValidationIssueKind::InheritanceTooDeep,
                    severity: Severity::Warning,
                    object: (*node).clone(),
                    description: format!(
                        "{node} has an inheritance chain {inheritance_depth} levels deep (limit {inheritance_depth_limit})"
                    ),
                    remediation: "flatten the inheritance hierarchy".to_string(),
                });
            }

            let view_chain_depth = self.chain_depth(node, DependencyType::ViewDependency);
            if view_chain_depth > view_chain_limit {
                issues.push(ValidationIssue {
                    kind: ValidationIssueKind::ViewChainTooLong,
                    severity: Severity::Warning,
                    object: (*node).clone(),
                    description: format!(
                        "{node} sits atop a view chain {view_chain_depth} levels deep (limit {view_chain_limit})"
                    ),
                    remediation: "materialize an intermediate view to shorten the chain"
                        .to_string(),
                });
            }
        }

        issues
    }

    /// Longest upstream chain of edges of `dependency_type` ending at `node`.
    fn chain_depth(&self, node: &str, dependency_type: DependencyType) -> u32 {
        let deps = match self.upstream.get(node) {
            Some(d) => d,
            None => return 0,
        };
        deps.iter()
            .filter(|dep| {
                self.edges.iter().any(|e| {
                    e.dependent_key == node
                        && e.depends_on_key == **dep
                        && e.dependency_type == dependency_type
                })
            })
            .map(|dep| 1 + self.chain_depth(dep, dependency_type))
            .max()
            .unwrap_or(0)
    }
}

fn risk_from_strength(strength: u8) -> Risk {
    if strength >= STRENGTH_FOREIGN_KEY {
        Risk::High
    } else if strength >= STRENGTH_INDEX_FUNCTION {
        Risk::Medium
    } else {
        Risk::Low
    }
}

fn suggested_action_for(operation: Direction, impact: ImpactLevel, risk: Risk) -> String {
    match (operation, risk) {
        (Direction::Drop, Risk::High) | (Direction::Drop, Risk::Critical) => {
            "review and migrate dependents before dropping".to_string()
        }
        (Direction::Drop, _) if impact == ImpactLevel::Direct => {
            "safe to drop after confirming no direct callers remain".to_string()
        }
        (Direction::Drop, _) => "monitor for breakage in downstream consumers".to_string(),
        (Direction::Create, _) => "ensure this dependency is created first".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactLevel {
    Direct,
    Indirect,
    Deep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRow {
    pub affected: String,
    pub path: Vec<String>,
    pub impact: ImpactLevel,
    pub risk: Risk,
    pub suggested_action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssueKind {
    CircularDependency,
    InheritanceTooDeep,
    ExcessiveIncomingForeignKeys,
    ViewChainTooLong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: ValidationIssueKind,
    pub severity: Severity,
    pub object: String,
    pub description: String,
    pub remediation: String,
}
