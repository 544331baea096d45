//! Task registry - the executor's concurrent id -> task map

use crate::task::{AnyTask, TaskId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::AbortHandle;

struct Registered {
    task: Arc<dyn AnyTask>,
    /// Set right after the body is spawned
    abort: Option<AbortHandle>,
}

/// Sharded map; inserts, lookups and removals never take a global lock.
#[derive(Default)]
pub(crate) struct Registry {
    tasks: DashMap<TaskId, Registered>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// False if a task with this id is already registered
    pub(crate) fn insert_new(&self, task: Arc<dyn AnyTask>) -> bool {
        match self.tasks.entry(task.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Registered { task, abort: None });
                true
            }
        }
    }

    pub(crate) fn set_abort_handle(&self, id: &TaskId, handle: AbortHandle) {
        if let Some(mut registered) = self.tasks.get_mut(id) {
            registered.abort = Some(handle);
        }
    }

    pub(crate) fn remove(&self, id: &TaskId) -> bool {
        self.tasks.remove(id).is_some()
    }

    pub(crate) fn get(&self, id: &TaskId) -> Option<Arc<dyn AnyTask>> {
        self.tasks.get(id).map(|registered| Arc::clone(&registered.task))
    }

    pub(crate) fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|registered| *registered.key()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Drop every terminal entry; returns how many were removed
    pub(crate) fn evict_terminal(&self) -> usize {
        let mut evicted = 0;
        self.tasks.retain(|_, registered| {
            let keep = !registered.task.status().is_terminal();
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Cooperatively cancel every registered task; returns how many changed state
    pub(crate) fn cancel_all(&self) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|task| task.cancel())
            .count()
    }

    /// Abort bodies that are still running; returns how many were aborted
    pub(crate) fn abort_unfinished(&self) -> usize {
        let handles: Vec<AbortHandle> = self
            .tasks
            .iter()
            .filter_map(|registered| registered.abort.clone())
            .filter(|handle| !handle.is_finished())
            .collect();
        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }

    pub(crate) fn clear(&self) {
        self.tasks.clear();
    }

    fn snapshot(&self) -> Vec<Arc<dyn AnyTask>> {
        self.tasks
            .iter()
            .map(|registered| Arc::clone(&registered.task))
            .collect()
    }
}
