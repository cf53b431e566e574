use bevy_ecs::prelude::*;
use fiefdom_protocol::packets::ResourceKind;
use glam::Vec2;

/// Identity of the player controlling an entity.
#[derive(Component, Clone, Debug)]
pub struct PlayerInfo {
    pub player_id: i64,
    pub account_id: i64,
    pub username: String,
}

/// Position on the world map.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Position(pub Vec2);

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self(Vec2::new(x, y))
    }
}

/// The four player resources.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resources {
    pub food: i32,
    pub wood: i32,
    pub stone: i32,
    pub gold: i32,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            food: 500,
            wood: 500,
            stone: 200,
            gold: 100,
        }
    }
}

impl Resources {
    pub fn get(&self, kind: ResourceKind) -> i32 {
        match kind {
            ResourceKind::Food => self.food,
            ResourceKind::Wood => self.wood,
            ResourceKind::Stone => self.stone,
            ResourceKind::Gold => self.gold,
        }
    }

    /// Applies a delta to one resource, flooring the result at zero.
    pub fn apply(&mut self, kind: ResourceKind, delta: i32) {
        let slot = match kind {
            ResourceKind::Food => &mut self.food,
            ResourceKind::Wood => &mut self.wood,
            ResourceKind::Stone => &mut self.stone,
            ResourceKind::Gold => &mut self.gold,
        };
        *slot = slot.saturating_add(delta).max(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_floors_at_zero() {
        let mut res = Resources::default();
        res.apply(ResourceKind::Gold, -5000);
        assert_eq!(res.gold, 0);

        res.apply(ResourceKind::Food, 200);
        assert_eq!(res.food, 700);
        assert_eq!(res.wood, 500);
    }
}
