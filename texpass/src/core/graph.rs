//! Task registry and execution-order resolution.
//!
//! Tasks are registered into a [`TaskGraphBuilder`] once at startup and then
//! frozen into an immutable [`TaskGraph`]. Resolution collects everything
//! reachable from the target through dependencies and finalizers, then sorts
//! it topologically with "owner before finalizer" as an extra ordering edge.
//! A finalizer is placed right after its owner whenever it is ready by then.

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use super::task::Task;

/// Configuration-time faults in the task graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("task '{name}' is already registered")]
    DuplicateTask { name: String },

    #[error("unknown task '{name}'{}", referenced_by(.required_by))]
    UnknownTask {
        name: String,
        required_by: Option<String>,
    },

    #[error("cycle detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("'{owner}' depends on its own finalizer '{finalizer}'")]
    FinalizerBeforeOwner { owner: String, finalizer: String },
}

fn referenced_by(required_by: &Option<String>) -> String {
    match required_by {
        Some(owner) => format!(" (referenced by '{owner}')"),
        None => String::new(),
    }
}

/// Mutable registry used while wiring tasks at startup.
#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    tasks: BTreeMap<String, Task>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. A duplicate name is rejected and the first registration kept.
    pub fn register(&mut self, task: Task) -> Result<(), GraphError> {
        if self.tasks.contains_key(&task.name) {
            return Err(GraphError::DuplicateTask { name: task.name });
        }
        debug!(task = %task.name, "registered task");
        self.tasks.insert(task.name.clone(), task);
        Ok(())
    }

    /// Freeze the registry after checking every reference and ordering constraint.
    pub fn build(self) -> Result<TaskGraph, GraphError> {
        let graph = TaskGraph { tasks: self.tasks };
        graph.validate()?;
        Ok(graph)
    }
}

/// Immutable set of tasks, keyed and iterated by name.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: BTreeMap<String, Task>,
}

impl TaskGraph {
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// All tasks in name order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Order in which `target` and everything it pulls in must run.
    ///
    /// Dependencies precede their dependents, finalizers follow their owners,
    /// and each task appears once.
    pub fn resolve(&self, target: &str) -> Result<Vec<&Task>, GraphError> {
        let resolver = Resolver::collect(self, target)?;
        resolver.check()?;
        let Some(order) = resolver.order() else {
            return Err(resolver.cycle_error());
        };
        debug!(
            target_task = target,
            order = ?order.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "resolved execution order"
        );
        Ok(order)
    }

    fn validate(&self) -> Result<(), GraphError> {
        for task in self.tasks.values() {
            for reference in task.references() {
                if !self.tasks.contains_key(reference) {
                    return Err(GraphError::UnknownTask {
                        name: reference.to_string(),
                        required_by: Some(task.name.clone()),
                    });
                }
            }
        }
        for name in self.tasks.keys() {
            self.resolve(name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Every task reachable from one target, through dependencies and finalizers.
///
/// Tasks are indexed in discovery order: a depth-first post-order over the
/// dependencies of the target, followed by finalizers (and their own
/// dependencies) as they are found. That order breaks ties in [`Self::order`].
struct Resolver<'g> {
    graph: &'g TaskGraph,
    tasks: Vec<&'g Task>,
    index: HashMap<&'g str, usize>,
    seen: HashSet<&'g str>,
    deps: Vec<Vec<usize>>,
    finalizers: Vec<Vec<usize>>,
    owners: Vec<Vec<usize>>,
}

impl<'g> Resolver<'g> {
    fn collect(graph: &'g TaskGraph, target: &str) -> Result<Self, GraphError> {
        let mut resolver = Self {
            graph,
            tasks: Vec::new(),
            index: HashMap::new(),
            seen: HashSet::new(),
            deps: Vec::new(),
            finalizers: Vec::new(),
            owners: Vec::new(),
        };
        resolver.discover(target, None)?;
        let mut next = 0;
        while next < resolver.tasks.len() {
            let owner = resolver.tasks[next];
            for finalizer in &owner.finalized_by {
                resolver.discover(finalizer, Some(&owner.name))?;
            }
            next += 1;
        }

        let count = resolver.tasks.len();
        resolver.deps = resolver
            .tasks
            .iter()
            .map(|task| resolver.indices(&task.depends_on))
            .collect();
        resolver.finalizers = resolver
            .tasks
            .iter()
            .map(|task| resolver.indices(&task.finalized_by))
            .collect();
        let mut owners = vec![Vec::new(); count];
        for (owner, finalizers) in resolver.finalizers.iter().enumerate() {
            for &finalizer in finalizers {
                owners[finalizer].push(owner);
            }
        }
        resolver.owners = owners;
        Ok(resolver)
    }

    fn discover(&mut self, name: &str, required_by: Option<&str>) -> Result<(), GraphError> {
        let graph = self.graph;
        let task = graph.get(name).ok_or_else(|| GraphError::UnknownTask {
            name: name.to_string(),
            required_by: required_by.map(str::to_string),
        })?;
        if !self.seen.insert(task.name.as_str()) {
            return Ok(());
        }
        for dep in &task.depends_on {
            self.discover(dep, Some(&task.name))?;
        }
        self.index.insert(task.name.as_str(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    fn indices(&self, names: &[String]) -> Vec<usize> {
        names
            .iter()
            .filter_map(|name| self.index.get(name.as_str()).copied())
            .collect()
    }

    /// Reject contradictions before ordering: dependency cycles, a task
    /// finalizing itself, and an owner that transitively depends on its own
    /// finalizer.
    fn check(&self) -> Result<(), GraphError> {
        if let Some(cycle) = self.find_cycle(false) {
            return Err(GraphError::CycleDetected { cycle });
        }
        for (owner, finalizers) in self.finalizers.iter().enumerate() {
            let owner_name = &self.tasks[owner].name;
            for &finalizer in finalizers {
                if finalizer == owner {
                    return Err(GraphError::CycleDetected {
                        cycle: vec![owner_name.clone(), owner_name.clone()],
                    });
                }
                if self.depends_on(owner, finalizer) {
                    return Err(GraphError::FinalizerBeforeOwner {
                        owner: owner_name.clone(),
                        finalizer: self.tasks[finalizer].name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether `task` transitively depends on `other`.
    fn depends_on(&self, task: usize, other: usize) -> bool {
        let mut visited = vec![false; self.tasks.len()];
        let mut pending = self.deps[task].clone();
        while let Some(next) = pending.pop() {
            if next == other {
                return true;
            }
            if !visited[next] {
                visited[next] = true;
                pending.extend_from_slice(&self.deps[next]);
            }
        }
        false
    }

    /// Topological order over dependency edges plus "owner before finalizer"
    /// edges. A ready finalizer of an already scheduled owner goes first;
    /// otherwise the earliest discovered ready task does. `None` when the
    /// combined relation has a cycle.
    fn order(&self) -> Option<Vec<&'g Task>> {
        let count = self.tasks.len();
        let mut waiting: Vec<usize> = (0..count)
            .map(|idx| self.deps[idx].len() + self.owners[idx].len())
            .collect();
        let mut unblocks = vec![Vec::new(); count];
        for (idx, (deps, owners)) in self.deps.iter().zip(&self.owners).enumerate() {
            for &before in deps.iter().chain(owners) {
                unblocks[before].push(idx);
            }
        }

        let mut scheduled = vec![false; count];
        let mut preferred: Vec<usize> = Vec::new();
        let mut order = Vec::with_capacity(count);
        while order.len() < count {
            let ready = |idx: &usize| !scheduled[*idx] && waiting[*idx] == 0;
            let next = preferred
                .iter()
                .copied()
                .find(|idx| ready(idx))
                .or_else(|| (0..count).find(|idx| ready(idx)))?;

            scheduled[next] = true;
            order.push(self.tasks[next]);
            preferred.retain(|idx| *idx != next);
            for &blocked in &unblocks[next] {
                waiting[blocked] -= 1;
            }
            preferred.extend(
                self.finalizers[next]
                    .iter()
                    .copied()
                    .filter(|idx| !scheduled[*idx]),
            );
        }
        Some(order)
    }

    /// Cycle through dependencies and finalizer edges together.
    fn cycle_error(&self) -> GraphError {
        let cycle = self.find_cycle(true).unwrap_or_else(|| {
            self.tasks.iter().map(|task| task.name.clone()).collect()
        });
        GraphError::CycleDetected { cycle }
    }

    /// A cycle through "must run after" edges: dependencies, and owners too
    /// when `with_owners` is set.
    fn find_cycle(&self, with_owners: bool) -> Option<Vec<String>> {
        let mut marks = vec![None; self.tasks.len()];
        let mut stack = Vec::new();
        (0..self.tasks.len())
            .find_map(|start| self.cycle_from(start, with_owners, &mut marks, &mut stack))
    }

    fn cycle_from(
        &self,
        idx: usize,
        with_owners: bool,
        marks: &mut [Option<Mark>],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        match marks[idx] {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|entry| *entry == idx).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..]
                    .iter()
                    .map(|entry| self.tasks[*entry].name.clone())
                    .collect();
                cycle.push(self.tasks[idx].name.clone());
                return Some(cycle);
            }
            None => {}
        }

        marks[idx] = Some(Mark::Visiting);
        stack.push(idx);
        let owners: &[usize] = if with_owners { &self.owners[idx] } else { &[] };
        for &next in self.deps[idx].iter().chain(owners) {
            if let Some(cycle) = self.cycle_from(next, with_owners, marks, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        marks[idx] = Some(Mark::Done);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{lifecycle, names};

    fn graph(tasks: Vec<Task>) -> Result<TaskGraph, GraphError> {
        let mut builder = TaskGraph::builder();
        for task in tasks {
            builder.register(task)?;
        }
        builder.build()
    }

    fn position(order: &[&str], name: &str) -> usize {
        order
            .iter()
            .position(|entry| *entry == name)
            .unwrap_or_else(|| panic!("{name} missing from {order:?}"))
    }

    #[test]
    fn dependencies_precede_dependents() {
        let graph = graph(vec![
            lifecycle("compile"),
            lifecycle("link").depends_on("compile"),
            lifecycle("test").depends_on("compile"),
            lifecycle("all").depends_on("link").depends_on("test"),
        ])
        .expect("graph");

        let order = names(&graph.resolve("all").expect("resolve"));
        assert_eq!(order, vec!["compile", "link", "test", "all"]);
    }

    #[test]
    fn diamond_dependency_runs_once() {
        let graph = graph(vec![
            lifecycle("base"),
            lifecycle("left").depends_on("base"),
            lifecycle("right").depends_on("base"),
            lifecycle("top").depends_on("left").depends_on("right"),
        ])
        .expect("graph");

        let order = names(&graph.resolve("top").expect("resolve"));
        assert_eq!(order.iter().filter(|n| **n == "base").count(), 1);
        assert!(position(&order, "base") < position(&order, "left"));
        assert!(position(&order, "base") < position(&order, "right"));
    }

    #[test]
    fn finalizer_follows_owner_immediately() {
        let graph = graph(vec![
            lifecycle("owner").finalized_by("cleanup"),
            lifecycle("cleanup"),
            lifecycle("next").depends_on("owner"),
        ])
        .expect("graph");

        let order = names(&graph.resolve("next").expect("resolve"));
        assert_eq!(order, vec!["owner", "cleanup", "next"]);
    }

    #[test]
    fn finalizer_dependencies_are_scheduled_before_it() {
        let graph = graph(vec![
            lifecycle("owner").finalized_by("report"),
            lifecycle("collect"),
            lifecycle("report").depends_on("collect"),
        ])
        .expect("graph");

        let order = names(&graph.resolve("owner").expect("resolve"));
        assert_eq!(order, vec!["owner", "collect", "report"]);
    }

    #[test]
    fn finalizer_that_depends_on_owner_is_placed_once() {
        let graph = graph(vec![
            lifecycle("owner").finalized_by("after"),
            lifecycle("after").depends_on("owner"),
        ])
        .expect("graph");

        assert_eq!(
            names(&graph.resolve("after").expect("resolve")),
            vec!["owner", "after"]
        );
        assert_eq!(
            names(&graph.resolve("owner").expect("resolve")),
            vec!["owner", "after"]
        );
    }

    #[test]
    fn resolving_a_leaf_ignores_unrelated_tasks() {
        let graph = graph(vec![lifecycle("a"), lifecycle("b").depends_on("a")]).expect("graph");
        assert_eq!(names(&graph.resolve("a").expect("resolve")), vec!["a"]);
    }

    #[test]
    fn duplicate_registration_keeps_first_task() {
        let mut builder = TaskGraph::builder();
        builder
            .register(lifecycle("x").describe("first"))
            .expect("first register");
        let err = builder
            .register(lifecycle("x").describe("second"))
            .expect_err("duplicate should fail");
        assert_eq!(
            err,
            GraphError::DuplicateTask {
                name: "x".to_string()
            }
        );

        let graph = builder.build().expect("graph");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get("x").expect("task x").description, "first");
    }

    #[test]
    fn unknown_dependency_is_rejected_at_build() {
        let err = graph(vec![lifecycle("build").depends_on("missing")])
            .expect_err("unknown dependency");
        assert_eq!(
            err,
            GraphError::UnknownTask {
                name: "missing".to_string(),
                required_by: Some("build".to_string()),
            }
        );
        assert_eq!(
            err.to_string(),
            "unknown task 'missing' (referenced by 'build')"
        );
    }

    #[test]
    fn unknown_target_is_rejected() {
        let graph = graph(vec![lifecycle("a")]).expect("graph");
        let err = graph.resolve("nope").expect_err("unknown target");
        assert_eq!(
            err,
            GraphError::UnknownTask {
                name: "nope".to_string(),
                required_by: None,
            }
        );
        assert_eq!(err.to_string(), "unknown task 'nope'");
    }

    #[test]
    fn dependency_cycle_is_detected() {
        let err = graph(vec![
            lifecycle("a").depends_on("b"),
            lifecycle("b").depends_on("c"),
            lifecycle("c").depends_on("a"),
        ])
        .expect_err("cycle");
        match err {
            GraphError::CycleDetected { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = graph(vec![lifecycle("a").depends_on("a")]).expect_err("cycle");
        assert_eq!(
            err,
            GraphError::CycleDetected {
                cycle: vec!["a".to_string(), "a".to_string()]
            }
        );
        assert_eq!(err.to_string(), "cycle detected: a -> a");
    }

    #[test]
    fn self_finalizer_is_a_cycle() {
        let err = graph(vec![lifecycle("a").finalized_by("a")]).expect_err("cycle");
        assert!(matches!(err, GraphError::CycleDetected { .. }));
    }

    #[test]
    fn finalizer_may_depend_on_a_dependent_of_its_owner() {
        let graph = graph(vec![
            lifecycle("owner").finalized_by("fin"),
            lifecycle("x").depends_on("owner"),
            lifecycle("fin").depends_on("x"),
        ])
        .expect("graph");

        assert_eq!(
            names(&graph.resolve("x").expect("resolve")),
            vec!["owner", "x", "fin"]
        );
        assert_eq!(
            names(&graph.resolve("owner").expect("resolve")),
            vec!["owner", "x", "fin"]
        );
    }

    #[test]
    fn finalizer_declared_before_its_owner_as_a_sibling() {
        let graph = graph(vec![
            lifecycle("owner").finalized_by("fin"),
            lifecycle("fin"),
            lifecycle("top").depends_on("fin").depends_on("owner"),
        ])
        .expect("graph");

        assert_eq!(
            names(&graph.resolve("top").expect("resolve")),
            vec!["owner", "fin", "top"]
        );
    }

    #[test]
    fn shared_finalizer_runs_after_every_owner() {
        let graph = graph(vec![
            lifecycle("a").finalized_by("report"),
            lifecycle("b").finalized_by("report"),
            lifecycle("report"),
            lifecycle("all").depends_on("a").depends_on("b"),
        ])
        .expect("graph");

        let order = names(&graph.resolve("all").expect("resolve"));
        assert_eq!(order, vec!["a", "b", "report", "all"]);
    }

    #[test]
    fn finalizers_of_each_other_form_a_cycle() {
        let err = graph(vec![
            lifecycle("a").finalized_by("b"),
            lifecycle("b").finalized_by("a"),
        ])
        .expect_err("cycle");
        match err {
            GraphError::CycleDetected { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn owner_depending_on_its_finalizer_is_rejected() {
        let err = graph(vec![
            lifecycle("setup"),
            lifecycle("prepare").depends_on("setup"),
            lifecycle("work").depends_on("prepare").finalized_by("setup"),
        ])
        .expect_err("owner depends on finalizer");
        assert_eq!(
            err,
            GraphError::FinalizerBeforeOwner {
                owner: "work".to_string(),
                finalizer: "setup".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "'work' depends on its own finalizer 'setup'"
        );
    }

    #[test]
    fn empty_builder_builds_an_empty_graph() {
        let graph = TaskGraph::builder().build().expect("graph");
        assert!(graph.is_empty());
        assert_eq!(graph.tasks().count(), 0);
    }
}
