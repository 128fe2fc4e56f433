//! The built-in entity-management module.
//!
//! The one module issued a superuser token. It contributes the generic
//! entity CRUD commands every container exposes regardless of which plugins
//! are installed.

use std::collections::BTreeMap;
use std::sync::Arc;

use sim_ecs::ComponentId;

use crate::abi::{
    payload_f32, payload_i64, CommandPayload, CommandSpec, EngineModule, ModuleContext,
    ModuleFactory, ParamDoc, ParamType,
};

/// Name of the built-in module; the registry issues its token as superuser.
pub const ENTITY_MANAGER_MODULE: &str = "entity_manager";

/// Factory for the built-in entity-management module.
pub struct EntityManagerFactory;

impl ModuleFactory for EntityManagerFactory {
    fn create(&self, ctx: Arc<ModuleContext>) -> Box<dyn EngineModule> {
        Box::new(EntityManagerModule { ctx })
    }
}

struct EntityManagerModule {
    ctx: Arc<ModuleContext>,
}

impl EngineModule for EntityManagerModule {
    fn name(&self) -> &str {
        ENTITY_MANAGER_MODULE
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            self.create_entity_command(),
            self.delete_entity_command(),
            self.attach_component_command(),
            self.remove_component_command(),
        ]
    }
}

impl EntityManagerModule {
    fn create_entity_command(&self) -> CommandSpec {
        let ctx = self.ctx.clone();
        CommandSpec {
            name: "create_entity".to_string(),
            module_name: ENTITY_MANAGER_MODULE.to_string(),
            schema: BTreeMap::from([("match_id".to_string(), ParamType::Integer)]),
            parameters: vec![ParamDoc {
                name: "match_id".to_string(),
                description: "Match the new entity belongs to".to_string(),
            }],
            executor: Arc::new(move |payload: &CommandPayload| {
                let match_id = payload_i64(payload, "match_id")?;
                ctx.store()?.create_entity_for_match(match_id)?;
                Ok(())
            }),
        }
    }

    fn delete_entity_command(&self) -> CommandSpec {
        let ctx = self.ctx.clone();
        CommandSpec {
            name: "delete_entity".to_string(),
            module_name: ENTITY_MANAGER_MODULE.to_string(),
            schema: BTreeMap::from([("entity_id".to_string(), ParamType::Integer)]),
            parameters: Vec::new(),
            executor: Arc::new(move |payload: &CommandPayload| {
                let entity = payload_i64(payload, "entity_id")?;
                ctx.store()?.delete_entity(entity)
            }),
        }
    }

    fn attach_component_command(&self) -> CommandSpec {
        let ctx = self.ctx.clone();
        CommandSpec {
            name: "attach_component".to_string(),
            module_name: ENTITY_MANAGER_MODULE.to_string(),
            schema: BTreeMap::from([
                ("entity_id".to_string(), ParamType::Integer),
                ("component_id".to_string(), ParamType::Integer),
                ("value".to_string(), ParamType::Float),
            ]),
            parameters: Vec::new(),
            executor: Arc::new(move |payload: &CommandPayload| {
                let entity = payload_i64(payload, "entity_id")?;
                let component = ComponentId(payload_i64(payload, "component_id")? as u64);
                let value = payload_f32(payload, "value")?;
                ctx.store()?.attach_component(entity, component, value)
            }),
        }
    }

    fn remove_component_command(&self) -> CommandSpec {
        let ctx = self.ctx.clone();
        CommandSpec {
            name: "remove_component".to_string(),
            module_name: ENTITY_MANAGER_MODULE.to_string(),
            schema: BTreeMap::from([
                ("entity_id".to_string(), ParamType::Integer),
                ("component_id".to_string(), ParamType::Integer),
            ]),
            parameters: Vec::new(),
            executor: Arc::new(move |payload: &CommandPayload| {
                let entity = payload_i64(payload, "entity_id")?;
                let component = ComponentId(payload_i64(payload, "component_id")? as u64);
                ctx.store()?.remove_component(entity, component)
            }),
        }
    }
}
