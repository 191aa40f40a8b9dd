//! Shared test fixtures: an in-memory cloud with fault injection and a
//! generic task type that can depend on other tasks of the same kind.

#![allow(dead_code)]

use async_trait::async_trait;
use fleetform_core::{
    Changes, CloudTask, Lifecycle, RunContext, Task, TaskError, TaskKey, TaskKind, TaskRef,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeCloud {
    resources: Mutex<HashMap<TaskKey, Value>>,
    render_order: Mutex<Vec<String>>,
    failing_finds: Mutex<HashSet<String>>,
    denied_finds: Mutex<HashSet<String>>,
    failing_renders: Mutex<HashSet<String>>,
    denied_renders: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    pub finds: AtomicUsize,
    pub mutations: AtomicUsize,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
    delay: Mutex<Duration>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, widget: &Widget) {
        let mut stored = widget.clone();
        stored.id = Some(format!("w-{}", widget.name));
        self.resources.lock().unwrap().insert(
            TaskKey::new(Widget::KIND, &widget.name),
            serde_json::to_value(&stored).unwrap(),
        );
    }

    pub fn stored(&self, name: &str) -> Option<Widget> {
        self.resources
            .lock()
            .unwrap()
            .get(&TaskKey::new(Widget::KIND, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn render_order(&self) -> Vec<String> {
        self.render_order.lock().unwrap().clone()
    }

    pub fn fail_find(&self, name: &str) {
        self.failing_finds.lock().unwrap().insert(name.to_string());
    }

    pub fn deny_find(&self, name: &str) {
        self.denied_finds.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_render(&self, name: &str) {
        self.failing_renders.lock().unwrap().insert(name.to_string());
    }

    pub fn deny_render(&self, name: &str) {
        self.denied_renders.lock().unwrap().insert(name.to_string());
    }

    pub fn panic_on(&self, name: &str) {
        self.panicking.lock().unwrap().insert(name.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let delay = *self.delay.lock().unwrap();
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub after: Vec<TaskRef<Widget>>,
    /// Assigned by the cloud
    #[serde(default)]
    pub id: Option<String>,
}

impl Widget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            lifecycle: Lifecycle::Sync,
            size: Some(1),
            after: Vec::new(),
            id: None,
        }
    }

    pub fn after(mut self, names: &[&str]) -> Self {
        self.after = names.iter().map(|n| TaskRef::new(*n)).collect();
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn boxed(self) -> Box<dyn Task<Arc<FakeCloud>>> {
        Box::new(self)
    }
}

impl TaskKind for Widget {
    const KIND: &'static str = "Widget";
}

#[async_trait]
impl CloudTask<Arc<FakeCloud>> for Widget {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    async fn find(&self, ctx: &RunContext<Arc<FakeCloud>>) -> Result<Option<Self>, TaskError> {
        let cloud = ctx.cloud();
        cloud.finds.fetch_add(1, Ordering::SeqCst);
        cloud.simulate_latency().await;

        if cloud.failing_finds.lock().unwrap().contains(&self.name) {
            return Err(TaskError::Query(format!("lookup of {} timed out", self.name)));
        }
        if cloud.denied_finds.lock().unwrap().contains(&self.name) {
            return Err(TaskError::PermissionDenied(format!(
                "no read access to {}",
                self.name
            )));
        }
        Ok(cloud.stored(&self.name))
    }

    async fn render(
        &self,
        ctx: &RunContext<Arc<FakeCloud>>,
        _actual: Option<&Self>,
        _changes: &Changes,
    ) -> Result<Option<Self>, TaskError> {
        let cloud = ctx.cloud();
        if cloud.panicking.lock().unwrap().contains(&self.name) {
            panic!("widget {} exploded", self.name);
        }
        if cloud.denied_renders.lock().unwrap().contains(&self.name) {
            return Err(TaskError::PermissionDenied(format!(
                "not allowed to write {}",
                self.name
            )));
        }
        if cloud.failing_renders.lock().unwrap().contains(&self.name) {
            return Err(TaskError::Mutation(format!("quota exceeded for {}", self.name)));
        }
        for parent in &self.after {
            let parent = ctx.resolve(parent)?;
            if parent.id.is_none() {
                return Err(TaskError::Mutation(format!(
                    "parent {} has no id",
                    parent.name
                )));
            }
        }

        cloud
            .render_order
            .lock()
            .unwrap()
            .push(self.name.clone());
        cloud.mutations.fetch_add(1, Ordering::SeqCst);
        cloud.seed(self);
        Ok(cloud.stored(&self.name))
    }
}

pub fn key(name: &str) -> TaskKey {
    TaskKey::new(Widget::KIND, name)
}
