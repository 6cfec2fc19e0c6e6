use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::{ResourceUsage, Stack};

#[derive(Default)]
struct StackStore {
    stacks: HashMap<Uuid, Stack>,
    label_index: HashMap<String, HashSet<Uuid>>,
}

impl StackStore {
    fn remove_from_label_index(&mut self, uuid: &Uuid) {
        self.label_index.retain(|_, uuids| {
            uuids.remove(uuid);
            !uuids.is_empty()
        });
    }

    fn insert(&mut self, stack: Stack) {
        self.remove_from_label_index(&stack.uuid);
        for label in &stack.labels {
            self.label_index
                .entry(label.clone())
                .or_default()
                .insert(stack.uuid);
        }
        self.stacks.insert(stack.uuid, stack);
    }
}

#[derive(Default)]
pub struct StackRepository {
    inner: Mutex<StackStore>,
}

impl StackRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes any previous label-index entries for `stack.uuid` before
    /// inserting the new ones, so the index never accumulates stale labels.
    pub fn save(&self, stack: Stack) {
        self.inner.lock().insert(stack);
    }

    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<Stack> {
        self.inner.lock().stacks.get(&uuid).cloned()
    }

    pub fn find_by_label(&self, label: &str) -> Vec<Stack> {
        let guard = self.inner.lock();
        match guard.label_index.get(label) {
            Some(uuids) => uuids
                .iter()
                .filter_map(|u| guard.stacks.get(u).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn get_all(&self) -> Vec<Stack> {
        self.inner.lock().stacks.values().cloned().collect()
    }

    /// Linear scan over every stack/service for `task_id`. Acceptable at
    /// the expected scale (<= 9*12*8 tasks).
    pub fn get_task_resources(&self, task_id: &str) -> Option<ResourceUsage> {
        let guard = self.inner.lock();
        guard
            .stacks
            .values()
            .find_map(|s| s.find_task(task_id))
            .map(|t| t.resources.clone())
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        guard.stacks.clear();
        guard.label_index.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().stacks.len()
    }

    /// Wholesale replace: clear then insert every stack from `stacks`.
    /// Used by the collector's stack tick, which is authoritative.
    pub fn replace_all(&self, stacks: Vec<Stack>) {
        let mut guard = self.inner.lock();
        guard.stacks.clear();
        guard.label_index.clear();
        for stack in stacks {
            guard.insert(stack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResourceUsage, Service, Task};
    use std::collections::HashMap as Map;

    fn sample_stack(labels: Vec<&str>) -> Stack {
        Stack {
            uuid: Uuid::new_v4(),
            name: "demo".into(),
            deploy_status: 1,
            running_status: 1,
            labels: labels.into_iter().map(String::from).collect(),
            services: Map::new(),
        }
    }

    #[test]
    fn save_then_find_round_trips() {
        let repo = StackRepository::new();
        let s = sample_stack(vec!["工作模式1"]);
        let uuid = s.uuid;
        repo.save(s.clone());
        let found = repo.find_by_uuid(uuid).unwrap();
        assert_eq!(found.uuid, uuid);
        assert_eq!(found.name, "demo");
        assert_eq!(found.deploy_status, 1);
        assert_eq!(found.running_status, 1);
    }

    #[test]
    fn find_by_label_returns_saved_stack() {
        let repo = StackRepository::new();
        let s = sample_stack(vec!["L1"]);
        let uuid = s.uuid;
        repo.save(s);
        let found = repo.find_by_label("L1");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uuid, uuid);
        assert!(repo.find_by_label("L2").is_empty());
    }

    #[test]
    fn re_saving_with_different_labels_drops_old_index_entries() {
        let repo = StackRepository::new();
        let mut s = sample_stack(vec!["old"]);
        let uuid = s.uuid;
        repo.save(s.clone());
        assert_eq!(repo.find_by_label("old").len(), 1);

        s.labels = vec!["new".into()];
        repo.save(s);
        assert!(repo.find_by_label("old").is_empty());
        assert_eq!(repo.find_by_label("new")[0].uuid, uuid);
    }

    #[test]
    fn replace_all_with_empty_clears_store() {
        let repo = StackRepository::new();
        repo.save(sample_stack(vec!["x"]));
        assert_eq!(repo.size(), 1);
        repo.replace_all(vec![]);
        assert_eq!(repo.size(), 0);
        assert!(repo.find_by_label("x").is_empty());
    }

    #[test]
    fn replace_all_size_matches_input_length() {
        let repo = StackRepository::new();
        repo.save(sample_stack(vec!["stale"]));
        let fresh = vec![sample_stack(vec!["a"]), sample_stack(vec!["b"])];
        repo.replace_all(fresh);
        assert_eq!(repo.size(), 2);
        assert!(repo.find_by_label("stale").is_empty());
    }

    #[test]
    fn get_task_resources_scans_all_stacks() {
        let repo = StackRepository::new();
        let mut s = sample_stack(vec![]);
        let mut service = Service::default();
        service.uuid = "svc-1".into();
        let mut usage = ResourceUsage::default();
        usage.cpu_usage = 0.5;
        let task = Task {
            task_id: "42".into(),
            task_status: 1,
            board_address: "10.0.0.1".into(),
            resources: usage,
        };
        service.tasks.insert("42".into(), task);
        s.services.insert("svc-1".into(), service);
        repo.save(s);

        let found = repo.get_task_resources("42").unwrap();
        assert_eq!(found.cpu_usage, 0.5);
        assert!(repo.get_task_resources("missing").is_none());
    }
}
