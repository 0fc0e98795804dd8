use std::collections::BTreeMap;
use std::sync::Arc;

use drudge_core::config::QueueConfig;
use drudge_core::handler::QueueHandler;
use drudge_core::QueueError;

/// A queue's configuration paired with the handler that processes it.
#[derive(Clone)]
pub struct Registration {
    pub config: QueueConfig,
    pub handler: Arc<dyn QueueHandler>,
}

/// All queues known to this deployment, keyed by queue name. Built once at
/// startup; the CLI dispatches provision, run, stop, and monitor commands
/// through it.
#[derive(Default)]
pub struct QueueRegistry {
    queues: BTreeMap<String, Registration>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        config: QueueConfig,
        handler: Arc<dyn QueueHandler>,
    ) -> Result<(), QueueError> {
        if self.queues.contains_key(&config.queue) {
            return Err(QueueError::DuplicateQueue(config.queue.clone()));
        }
        self.queues
            .insert(config.queue.clone(), Registration { config, handler });
        Ok(())
    }

    pub fn get(&self, queue: &str) -> Option<&Registration> {
        self.queues.get(queue)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.queues.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.queues.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
