//! Execution containers and the fleet manager.
//!
//! A [`SimContainer`] composes one isolated simulation environment: the ECS
//! store stack, token service, module registry, command pipeline, session
//! and match stores, snapshot engine, resource area, and a dedicated tick
//! worker task. The [`ContainerManager`] is the fleet directory that
//! allocates container ids and shuts everything down in order.

mod commands;
mod config;
mod container;
mod game_loop;
mod listener;
mod manager;
mod matches;
mod metrics;
mod resources;
mod session;
mod worker;

pub use commands::{CommandQueue, CommandResolver, QueuedCommand};
pub use config::ContainerConfig;
pub use container::{CommandDispatch, ContainerStatus, NamedCommand, SimContainer};
pub use game_loop::GameLoop;
pub use listener::{DocumentStoreListener, TickCompleteListener};
pub use manager::ContainerManager;
pub use matches::{Match, MatchRegistry};
pub use metrics::{
    BenchmarkReport, CommandMetrics, ContainerMetrics, ContainerStats, MetricsState, SystemMetrics,
    TickTimings,
};
pub use resources::ResourceArea;
pub use session::{PlayerSession, SessionStatus, SessionStore};
pub use worker::{WorkerEvent, WorkerHandle};
