//! End-to-end scenarios through a running container: command pipeline,
//! snapshot extraction, delta round-trips, and document persistence.

use std::collections::BTreeMap;
use std::sync::Arc;

use sim_ecs::{ComponentDef, ComponentId, SimError};
use sim_module::{
    payload_f32, payload_i64, CommandPayload, CommandSpec, EngineModule, EngineSystem,
    ModuleContext, ModuleFactory, ParamType,
};
use sim_runtime::{ContainerConfig, ContainerManager, DocumentStoreListener, Match, SimContainer};
use sim_snapshot::{apply_delta, compute_delta, value_equal, SnapshotDocument};

const FLAG: ComponentId = ComponentId(100);
const POS_X: ComponentId = ComponentId(101);
const POS_Y: ComponentId = ComponentId(102);

/// A movement module: spawn/nudge commands, one drift system, a benchmark
/// scope around the system body.
struct MovementModule {
    ctx: Arc<ModuleContext>,
}

struct DriftSystem {
    ctx: Arc<ModuleContext>,
}

impl EngineSystem for DriftSystem {
    fn name(&self) -> &str {
        "drift"
    }

    fn update(&mut self) -> Result<(), SimError> {
        let _scope = self.ctx.benchmarks().scope("drift");
        let store = self.ctx.store()?;
        for entity in store.entities_with_components(&[FLAG, POS_X])? {
            let x = store.get_component(entity, POS_X)?;
            store.attach_component(entity, POS_X, x + 1.0)?;
        }
        Ok(())
    }
}

impl EngineModule for MovementModule {
    fn name(&self) -> &str {
        "movement"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn flag_component(&self) -> Option<ComponentDef> {
        Some(ComponentDef::flag(FLAG, "movement_flag"))
    }

    fn components(&self) -> Vec<ComponentDef> {
        vec![
            ComponentDef::value(POS_X, "position_x"),
            ComponentDef::value(POS_Y, "position_y"),
        ]
    }

    fn systems(&self) -> Vec<Box<dyn EngineSystem>> {
        vec![Box::new(DriftSystem {
            ctx: self.ctx.clone(),
        })]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let spawn_ctx = self.ctx.clone();
        let nudge_ctx = self.ctx.clone();
        vec![
            CommandSpec {
                name: "spawn_mover".to_string(),
                module_name: "movement".to_string(),
                schema: BTreeMap::from([
                    ("match_id".to_string(), ParamType::Integer),
                    ("x".to_string(), ParamType::Float),
                ]),
                parameters: Vec::new(),
                executor: Arc::new(move |payload: &CommandPayload| {
                    let store = spawn_ctx.store()?;
                    let entity =
                        store.create_entity_for_match(payload_i64(payload, "match_id")?)?;
                    store.attach_component(entity, FLAG, 1.0)?;
                    store.attach_component(entity, POS_X, payload_f32(payload, "x")?)
                }),
            },
            CommandSpec {
                name: "nudge_y".to_string(),
                module_name: "movement".to_string(),
                schema: BTreeMap::from([
                    ("entity_id".to_string(), ParamType::Integer),
                    ("y".to_string(), ParamType::Float),
                ]),
                parameters: Vec::new(),
                executor: Arc::new(move |payload: &CommandPayload| {
                    nudge_ctx.store()?.attach_component(
                        payload_i64(payload, "entity_id")?,
                        POS_Y,
                        payload_f32(payload, "y")?,
                    )
                }),
            },
        ]
    }
}

struct MovementFactory;

impl ModuleFactory for MovementFactory {
    fn create(&self, ctx: Arc<ModuleContext>) -> Box<dyn EngineModule> {
        Box::new(MovementModule { ctx })
    }
}

fn fleet(dir: &tempfile::TempDir) -> ContainerManager {
    ContainerManager::with_resource_root(dir.path().join("resources"))
}

fn config(name: &str, dir: &tempfile::TempDir) -> ContainerConfig {
    let mut config = ContainerConfig::new(name);
    config.module_scan_directory = dir.path().join("modules");
    config.max_entities = 256;
    config.max_components = 32;
    config
}

async fn running_container(dir: &tempfile::TempDir) -> (ContainerManager, Arc<SimContainer>) {
    let manager = fleet(dir);
    let container = manager.create_container(config("c1", dir)).unwrap();
    container.start().unwrap();
    container
        .registry()
        .unwrap()
        .register_builtin(Arc::new(MovementFactory))
        .unwrap();
    (manager, container)
}

fn payload(pairs: &[(&str, serde_json::Value)]) -> CommandPayload {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_commands_feed_the_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, c) = running_container(&dir).await;
    c.create_match(Match::new(100)).unwrap();

    c.commands()
        .named("spawn_mover")
        .unwrap()
        .for_match(100)
        .execute(payload(&[("x", serde_json::json!(10.0))]))
        .unwrap();

    // Nothing applied until a tick drains the queue.
    assert_eq!(c.store().unwrap().entity_count(), 0);
    c.advance_tick().await.unwrap();
    assert_eq!(c.store().unwrap().entity_count(), 1);

    // The drift system ran in the same tick, after the command.
    let store = c.store().unwrap();
    let entity = store.entities_with_components(&[FLAG])[0];
    assert_eq!(store.get_component(entity, POS_X).unwrap(), 11.0);

    c.stop().await.unwrap();
}

#[tokio::test]
async fn test_match_scoped_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, c) = running_container(&dir).await;
    c.create_match(Match::new(100)).unwrap();
    c.create_match(Match::new(200)).unwrap();

    for (match_id, x) in [(100, 1.0), (100, 2.0), (200, 3.0)] {
        c.commands()
            .named("spawn_mover")
            .unwrap()
            .for_match(match_id)
            .execute(payload(&[("x", serde_json::json!(x))]))
            .unwrap();
    }
    c.advance_tick().await.unwrap();

    let snapshot = c.snapshots().unwrap().create_for_match(100).unwrap();
    let module = snapshot.module("movement").expect("movement rows");
    assert_eq!(module.entity_ids().len(), 2);
    let other = c.snapshots().unwrap().create_for_match(200).unwrap();
    assert_eq!(other.module("movement").unwrap().entity_ids().len(), 1);

    c.stop().await.unwrap();
}

#[tokio::test]
async fn test_delta_round_trip_over_live_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, c) = running_container(&dir).await;
    c.create_match(Match::new(100)).unwrap();

    c.commands()
        .named("spawn_mover")
        .unwrap()
        .for_match(100)
        .execute(payload(&[("x", serde_json::json!(100.0))]))
        .unwrap();
    let t1 = c.advance_tick().await.unwrap();
    let from = c.snapshots().unwrap().create_for_match(100).unwrap();

    // Second tick: drift moves x, and a command attaches y.
    let entity = c.store().unwrap().entities_with_components(&[FLAG])[0];
    c.commands()
        .named("nudge_y")
        .unwrap()
        .execute(payload(&[
            ("entity_id", serde_json::json!(entity)),
            ("y", serde_json::json!(75.0)),
        ]))
        .unwrap();
    let t2 = c.advance_tick().await.unwrap();
    let to = c.snapshots().unwrap().create_for_match(100).unwrap();

    let delta = compute_delta(100, t1, t2, &from, &to);
    assert!(delta.added_entities.is_empty());
    assert!(delta.removed_entities.is_empty());
    let movement = &delta.changed_components["movement"];
    assert!(movement.contains_key("position_x"));
    assert_eq!(movement["position_y"][&entity], 75.0);

    let applied = apply_delta(&from, &delta);
    assert!(value_equal(&applied, &to));

    c.stop().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_documents_persisted_each_tick() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, c) = running_container(&dir).await;
    c.create_match(Match::new(100)).unwrap();
    c.commands()
        .named("spawn_mover")
        .unwrap()
        .for_match(100)
        .execute(payload(&[("x", serde_json::json!(5.0))]))
        .unwrap();
    let tick = c.advance_tick().await.unwrap();

    let resources = c.resources().unwrap();
    let path = DocumentStoreListener::document_path(100, tick);
    let bytes = resources.read(&path).expect("document persisted");
    let document: SnapshotDocument = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(document.container_id, c.id());
    assert_eq!(document.match_id, 100);
    assert_eq!(document.tick, tick);
    assert!(document.data["movement"].contains_key("position_x"));

    c.stop().await.unwrap();
}

#[tokio::test]
async fn test_benchmark_surface_full_names() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, c) = running_container(&dir).await;
    c.create_match(Match::new(100)).unwrap();
    c.commands()
        .named("spawn_mover")
        .unwrap()
        .for_match(100)
        .execute(payload(&[("x", serde_json::json!(0.0))]))
        .unwrap();
    c.advance_tick().await.unwrap();

    let metrics = c.metrics().unwrap();
    assert_eq!(metrics.total_ticks, 1);
    assert!(!metrics.last_tick_systems.is_empty());
    assert!(!metrics.last_tick_commands.is_empty());
    let bench = metrics
        .last_tick_benchmarks
        .iter()
        .find(|b| b.scope_name == "drift")
        .expect("drift scope recorded");
    assert_eq!(bench.full_name, "movement:drift");
    assert_eq!(bench.full_name.split(':').count(), 2);
    assert!(bench.execution_time_nanos >= 0);

    c.stop().await.unwrap();
}

#[tokio::test]
async fn test_fleet_lifecycle_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let manager = fleet(&dir);
    let c1 = manager.create_container(config("c1", &dir)).unwrap();
    let c2 = manager.create_container(config("c2", &dir)).unwrap();
    c1.start().unwrap();
    c2.start().unwrap();

    assert_eq!(manager.find_by_name("c2").unwrap().id(), c2.id());

    // Containers are isolated: entities in c1 never show up in c2.
    c1.store().unwrap().create_entity_for_match(1).unwrap();
    assert_eq!(c1.store().unwrap().entity_count(), 1);
    assert_eq!(c2.store().unwrap().entity_count(), 0);

    manager.shutdown_all().await;
    assert_eq!(manager.count(), 0);
}

#[tokio::test]
async fn test_module_uninstall_stops_its_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (_manager, c) = running_container(&dir).await;
    assert!(c.commands().named("spawn_mover").is_ok());

    c.uninstall_module("movement").unwrap();
    assert!(matches!(
        c.commands().named("spawn_mover"),
        Err(SimError::NotFound(_))
    ));
    // The built-in module is untouched.
    assert!(c.commands().named("create_entity").is_ok());

    c.stop().await.unwrap();
}
