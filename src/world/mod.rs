//! Kingdom worlds: one isolated simulation per kingdom, each owning a
//! component store, a spatial index, and an ordered list of game systems.

mod components;
pub mod registry;

use bevy_ecs::entity::Entity;
use bevy_ecs::world::World;
use fiefdom_spatial::SpatialGrid;
use tracing::info;

pub use components::{PlayerInfo, Position, Resources};

/// A pluggable gameplay system, ticked by its kingdom every frame.
pub trait GameSystem: Send {
    /// Name of the system, for logs.
    fn name(&self) -> &'static str;

    /// Advances the system by `dt` seconds over the kingdom's store.
    fn tick(&mut self, dt: f32, store: &mut World);
}

/// An isolated world with its own entities and spatial index.
pub struct KingdomWorld {
    id: i32,
    name: String,
    pub store: World,
    pub grid: SpatialGrid<Entity>,
    systems: Vec<Box<dyn GameSystem>>,
}

impl KingdomWorld {
    pub fn new(id: i32, name: &str) -> Self {
        info!(id, name, "kingdom created");

        Self {
            id,
            name: name.to_owned(),
            store: World::new(),
            grid: SpatialGrid::default(),
            systems: Vec::new(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a gameplay system. Systems tick in registration order.
    pub fn add_system(&mut self, system: Box<dyn GameSystem>) {
        info!(kingdom = %self.name, system = system.name(), "game system registered");
        self.systems.push(system);
    }

    /// Ticks every registered system.
    pub fn on_tick(&mut self, dt: f32) {
        let Self {
            store, systems, ..
        } = self;

        for system in systems {
            system.tick(dt, store);
        }
    }

    /// Spawns a player entity and registers it in the spatial grid.
    pub fn spawn_player(&mut self, info: PlayerInfo, pos: Position, res: Resources) -> Entity {
        let entity = self.store.spawn((info, pos, res)).id();
        self.grid.insert(entity, pos.0.x, pos.0.y);
        entity
    }

    /// Removes an entity from the grid, then destroys it if it is still
    /// alive in the store. Grid removal must come first so the index never
    /// references a dead entity.
    pub fn despawn_entity(&mut self, entity: Entity) -> bool {
        self.grid.remove(entity);

        if self.store.get_entity(entity).is_some() {
            self.store.despawn(entity)
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;

    struct CountingSystem {
        ticks: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    impl GameSystem for CountingSystem {
        fn name(&self) -> &'static str {
            self.name
        }

        fn tick(&mut self, _dt: f32, _store: &mut World) {
            self.ticks.lock().push(self.name);
        }
    }

    #[test]
    fn systems_tick_in_registration_order() {
        let ticks: Arc<parking_lot::Mutex<Vec<&'static str>>> = Arc::default();
        let mut world = KingdomWorld::new(1, "Royaume Principal");

        for name in ["movement", "combat", "production"] {
            world.add_system(Box::new(CountingSystem {
                ticks: Arc::clone(&ticks),
                name,
            }));
        }

        world.on_tick(0.05);
        world.on_tick(0.05);

        assert_eq!(
            *ticks.lock(),
            vec![
                "movement",
                "combat",
                "production",
                "movement",
                "combat",
                "production"
            ]
        );
    }

    #[test]
    fn spawn_registers_entity_in_store_and_grid() {
        let mut world = KingdomWorld::new(1, "Test");

        let entity = world.spawn_player(
            PlayerInfo {
                player_id: 42,
                account_id: 42,
                username: "alice".to_owned(),
            },
            Position::new(150.0, 250.0),
            Resources::default(),
        );

        assert!(world.store.get_entity(entity).is_some());
        assert_eq!(world.store.get::<Resources>(entity).unwrap().food, 500);
        assert_eq!(world.store.get::<PlayerInfo>(entity).unwrap().username, "alice");

        let mut near = vec![];
        world.grid.query_neighbors(150.0, 250.0, &mut near);
        assert_eq!(near, vec![entity]);
    }

    #[test]
    fn despawn_clears_grid_before_store() {
        let mut world = KingdomWorld::new(1, "Test");

        let entity = world.spawn_player(
            PlayerInfo {
                player_id: 1,
                account_id: 1,
                username: "bob".to_owned(),
            },
            Position::new(0.0, 0.0),
            Resources::default(),
        );

        assert!(world.despawn_entity(entity));
        assert!(world.store.get_entity(entity).is_none());
        assert!(world.grid.is_empty());

        // Despawning again is harmless.
        assert!(!world.despawn_entity(entity));
    }
}
