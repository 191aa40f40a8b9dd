//! Dependency graph over tasks
//!
//! Edges are derived from the [`crate::TaskRef`] fields each task holds: a
//! task that references another must run after it. The graph is built once
//! per run and is read-only while the executor walks it.

use crate::error::GraphError;
use crate::refs::collect_references;
use crate::task::{Task, TaskKey};
use std::collections::HashMap;

/// Directed acyclic graph of tasks, indexed in insertion order
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    keys: Vec<TaskKey>,
    index: HashMap<TaskKey, usize>,
    /// node -> nodes it depends on
    dependencies: Vec<Vec<usize>>,
    /// node -> nodes that depend on it
    dependents: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

impl DependencyGraph {
    /// Resolves the dependencies of a task set
    pub fn build<C>(tasks: &[Box<dyn Task<C>>]) -> Result<Self, GraphError> {
        let mut nodes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let key = task.key();
            let desired = task.desired().map_err(|e| GraphError::Introspection {
                task: key.clone(),
                reason: e.to_string(),
            })?;
            nodes.push((key, collect_references(&desired)));
        }
        Self::from_edges(nodes)
    }

    /// Builds the graph from `(task, dependencies)` pairs.
    ///
    /// Fails on duplicate keys, references to keys outside the set, and
    /// cycles (including a task depending on itself).
    pub fn from_edges<I>(nodes: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (TaskKey, Vec<TaskKey>)>,
    {
        let nodes: Vec<(TaskKey, Vec<TaskKey>)> = nodes.into_iter().collect();

        let mut keys = Vec::with_capacity(nodes.len());
        let mut index = HashMap::with_capacity(nodes.len());
        for (key, _) in &nodes {
            if index.insert(key.clone(), keys.len()).is_some() {
                return Err(GraphError::DuplicateTask(key.clone()));
            }
            keys.push(key.clone());
        }

        let mut dependencies = vec![Vec::new(); keys.len()];
        let mut dependents = vec![Vec::new(); keys.len()];
        for (node, (key, deps)) in nodes.iter().enumerate() {
            for dep in deps {
                let Some(&target) = index.get(dep) else {
                    return Err(GraphError::DanglingReference {
                        task: key.clone(),
                        missing: dep.clone(),
                    });
                };
                if !dependencies[node].contains(&target) {
                    dependencies[node].push(target);
                    dependents[target].push(node);
                }
            }
        }

        let graph = Self {
            keys,
            index,
            dependencies,
            dependents,
        };

        if let Some(cycle) = graph.find_cycle() {
            return Err(GraphError::Cycle(cycle));
        }

        tracing::debug!(
            "Resolved {} task(s) with {} dependency edge(s)",
            graph.len(),
            graph.dependencies.iter().map(Vec::len).sum::<usize>()
        );
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[TaskKey] {
        &self.keys
    }

    pub fn key(&self, node: usize) -> &TaskKey {
        &self.keys[node]
    }

    pub fn index_of(&self, key: &TaskKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.dependencies[node]
    }

    pub fn dependents(&self, node: usize) -> &[usize] {
        &self.dependents[node]
    }

    /// Keys a task depends on
    pub fn dependencies_of(&self, key: &TaskKey) -> Vec<&TaskKey> {
        self.index_of(key)
            .map(|n| self.dependencies[n].iter().map(|&d| &self.keys[d]).collect())
            .unwrap_or_default()
    }

    /// Nodes all of whose dependencies satisfy `done`, among nodes that satisfy `pending`
    pub fn ready<P, D>(&self, pending: P, done: D) -> Vec<usize>
    where
        P: Fn(usize) -> bool,
        D: Fn(usize) -> bool,
    {
        (0..self.len())
            .filter(|&n| pending(n) && self.dependencies[n].iter().all(|&d| done(d)))
            .collect()
    }

    /// Execution stages (Kahn's algorithm): every task in a stage only
    /// depends on tasks in earlier stages. Stages keep insertion order.
    pub fn stages(&self) -> Vec<Vec<usize>> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut current: Vec<usize> = (0..self.len()).filter(|&n| in_degree[n] == 0).collect();
        let mut stages = Vec::new();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &node in &current {
                for &dependent in &self.dependents[node] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            stages.push(std::mem::replace(&mut current, next));
        }

        stages
    }

    /// Topological order, predecessors first
    pub fn topological_order(&self) -> Vec<usize> {
        self.stages().into_iter().flatten().collect()
    }

    /// Depth-first search for a back-edge.
    ///
    /// Returns the full cycle, starting and ending at the same task. The
    /// search keeps its own stack of `(node, next dependency)` frames, so
    /// chain length is not bounded by the thread's stack.
    fn find_cycle(&self) -> Option<Vec<TaskKey>> {
        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut path: Vec<(usize, usize)> = Vec::new();

        for root in 0..self.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::OnPath;
            path.push((root, 0));

            while let Some(frame) = path.last_mut() {
                let (node, next) = *frame;
                let Some(&dep) = self.dependencies[node].get(next) else {
                    marks[node] = Mark::Done;
                    path.pop();
                    continue;
                };
                frame.1 += 1;

                match marks[dep] {
                    Mark::OnPath => {
                        let start = path.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                        let mut cycle: Vec<TaskKey> = path[start..]
                            .iter()
                            .map(|&(n, _)| self.keys[n].clone())
                            .collect();
                        cycle.push(self.keys[dep].clone());
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        marks[dep] = Mark::OnPath;
                        path.push((dep, 0));
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> TaskKey {
        TaskKey::new("Task", name)
    }

    fn node(name: &str, deps: &[&str]) -> (TaskKey, Vec<TaskKey>) {
        (key(name), deps.iter().map(|d| key(d)).collect())
    }

    #[test]
    fn test_stages_respect_dependencies() {
        let graph = DependencyGraph::from_edges(vec![
            node("instance", &["subnet", "sg"]),
            node("subnet", &["network"]),
            node("sg", &["network"]),
            node("network", &[]),
        ])
        .unwrap();

        let stages: Vec<Vec<&str>> = graph
            .stages()
            .iter()
            .map(|s| s.iter().map(|&n| graph.key(n).name()).collect())
            .collect();
        assert_eq!(
            stages,
            vec![vec!["network"], vec!["subnet", "sg"], vec!["instance"]]
        );
    }

    #[test]
    fn test_topological_order_puts_predecessors_first() {
        let graph = DependencyGraph::from_edges(vec![
            node("d", &["c"]),
            node("c", &["b"]),
            node("b", &["a"]),
            node("a", &[]),
            node("x", &["a", "d"]),
        ])
        .unwrap();

        let order = graph.topological_order();
        let position = |name: &str| {
            order
                .iter()
                .position(|&n| graph.key(n).name() == name)
                .unwrap()
        };
        for n in 0..graph.len() {
            for &dep in graph.dependencies(n) {
                assert!(position(graph.key(dep).name()) < position(graph.key(n).name()));
            }
        }
    }

    #[test]
    fn test_cycle_is_reported_in_full() {
        let err = DependencyGraph::from_edges(vec![
            node("a", &["b"]),
            node("b", &["c"]),
            node("c", &["a"]),
            node("d", &[]),
        ])
        .unwrap_err();

        let GraphError::Cycle(cycle) = err else {
            panic!("expected a cycle, got {:?}", err);
        };
        assert_eq!(cycle.len(), 4);
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle, vec![key("a"), key("b"), key("c"), key("a")]);
    }

    #[test]
    fn test_long_chain_does_not_exhaust_the_stack() {
        const LEN: usize = 200_000;
        let name = |i: usize| format!("t{}", i);
        let chain = || {
            (0..LEN).map(move |i| {
                let deps = if i == 0 { Vec::new() } else { vec![key(&name(i - 1))] };
                (key(&name(i)), deps)
            })
        };

        let graph = DependencyGraph::from_edges(chain()).unwrap();
        assert_eq!(graph.stages().len(), LEN);

        // closing the chain into a loop is reported in full
        let closed = chain().map(|(k, mut deps)| {
            if k == key("t0") {
                deps.push(key(&name(LEN - 1)));
            }
            (k, deps)
        });
        let GraphError::Cycle(cycle) = DependencyGraph::from_edges(closed).unwrap_err() else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle.len(), LEN + 1);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = DependencyGraph::from_edges(vec![node("a", &["a"])]).unwrap_err();
        assert_eq!(err, GraphError::Cycle(vec![key("a"), key("a")]));
    }

    #[test]
    fn test_dangling_reference() {
        let err = DependencyGraph::from_edges(vec![node("subnet", &["network"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingReference {
                task: key("subnet"),
                missing: key("network"),
            }
        );
    }

    #[test]
    fn test_duplicate_task() {
        let err =
            DependencyGraph::from_edges(vec![node("a", &[]), node("a", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask(key("a")));
    }

    #[test]
    fn test_ready_set() {
        let graph = DependencyGraph::from_edges(vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &[]),
        ])
        .unwrap();

        let ready = graph.ready(|_| true, |_| false);
        assert_eq!(ready, vec![0, 2]);

        let ready = graph.ready(|n| n == 1, |n| n == 0);
        assert_eq!(ready, vec![1]);
    }
}
