//! The per-container command pipeline: queue and resolver.
//!
//! External actors enqueue `(command, payload)` pairs from any thread; the
//! tick worker is the single consumer, draining a bounded batch at the start
//! of each tick. Commands enqueued while systems run land in the next tick.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use sim_ecs::SimError;
use sim_module::{CommandPayload, CommandSpec, ModuleRegistry};

/// A resolved command waiting in the queue.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub spec: Arc<CommandSpec>,
    pub payload: CommandPayload,
}

/// Unbounded MPSC command queue with a bounded per-tick drain.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<QueuedCommand>>>,
}

impl CommandQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a command. FIFO per submitter; total order is lock order.
    pub fn enqueue(&self, command: QueuedCommand) {
        self.inner.lock().push_back(command);
    }

    /// Dequeue up to `max` commands, oldest first.
    #[must_use]
    pub fn drain(&self, max: usize) -> Vec<QueuedCommand> {
        let mut queue = self.inner.lock();
        let n = queue.len().min(max);
        queue.drain(..n).collect()
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Name → command lookup, cached until the registry changes.
pub struct CommandResolver {
    registry: Arc<ModuleRegistry>,
    cache: Mutex<ResolverCache>,
}

#[derive(Default)]
struct ResolverCache {
    generation: u64,
    commands: HashMap<String, Arc<CommandSpec>>,
}

impl std::fmt::Debug for CommandResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandResolver").finish_non_exhaustive()
    }
}

impl CommandResolver {
    /// Create a resolver over a registry.
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            cache: Mutex::new(ResolverCache::default()),
        }
    }

    /// Resolve a command name.
    ///
    /// # Errors
    ///
    /// `NotFound` when no loaded module contributes the command.
    pub fn resolve(&self, name: &str) -> Result<Arc<CommandSpec>, SimError> {
        let generation = self.registry.generation();
        let mut cache = self.cache.lock();
        if cache.generation != generation {
            cache.commands.clear();
            cache.generation = generation;
        }
        if let Some(spec) = cache.commands.get(name) {
            return Ok(spec.clone());
        }
        let spec = self
            .registry
            .command(name)
            .ok_or_else(|| SimError::NotFound(format!("command '{name}'")))?;
        cache.commands.insert(name.to_string(), spec.clone());
        Ok(spec)
    }
}
