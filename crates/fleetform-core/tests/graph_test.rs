//! Dependency resolution from task fields

mod common;

use common::{FakeCloud, Widget, key};
use fleetform_core::{DependencyGraph, GraphError, Task, describe};
use std::sync::Arc;

#[test]
fn test_edges_come_from_reference_fields() {
    let tasks: Vec<Box<dyn Task<Arc<FakeCloud>>>> = vec![
        Widget::new("lb").after(&["web-1", "web-2"]).boxed(),
        Widget::new("web-1").after(&["subnet"]).boxed(),
        Widget::new("web-2").after(&["subnet", "subnet"]).boxed(),
        Widget::new("subnet").boxed(),
    ];
    let graph = DependencyGraph::build(&tasks).unwrap();

    assert_eq!(graph.dependencies_of(&key("lb")), vec![&key("web-1"), &key("web-2")]);
    // repeated references collapse into one edge
    assert_eq!(graph.dependencies_of(&key("web-2")), vec![&key("subnet")]);
    assert!(graph.dependencies_of(&key("subnet")).is_empty());

    let stages: Vec<Vec<&str>> = graph
        .stages()
        .iter()
        .map(|s| s.iter().map(|&n| graph.key(n).name()).collect())
        .collect();
    assert_eq!(stages, vec![vec!["subnet"], vec!["web-1", "web-2"], vec!["lb"]]);
}

#[test]
fn test_duplicate_task_is_rejected() {
    let tasks: Vec<Box<dyn Task<Arc<FakeCloud>>>> =
        vec![Widget::new("a").boxed(), Widget::new("a").size(2).boxed()];
    assert_eq!(
        DependencyGraph::build(&tasks).unwrap_err(),
        GraphError::DuplicateTask(key("a"))
    );
}

#[test]
fn test_describe_shows_references_by_key() {
    let task = Widget::new("subnet").after(&["network"]).boxed();
    let text = describe(task.as_ref());
    assert!(text.starts_with("Widget/subnet {"));
    assert!(text.contains("Widget/network"));
}
