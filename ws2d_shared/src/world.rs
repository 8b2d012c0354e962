//! World model.
//!
//! An ordered list of axis-aligned entities. Index 0 is always the locally
//! controlled entity; everything else is whatever the sync/input layers put
//! there.

/// Side length of the square playfield, in world units.
pub const WORLD_SIZE: f64 = 12000.0;

/// A positioned entity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Entity {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Entity {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn radius(&self) -> f64 {
        self.w / 2.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct World {
    entities: Vec<Entity>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// World with a single controlled entity parked at the far corner.
    pub fn with_test_entity() -> Self {
        let mut world = Self::new();
        world.push(Entity::new(WORLD_SIZE, WORLD_SIZE, 50.0, 50.0));
        world
    }

    pub fn push(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Option<Entity> {
        (index < self.entities.len()).then(|| self.entities.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.entities.get_mut(index)
    }

    pub fn controlled(&self) -> Option<&Entity> {
        self.entities.first()
    }

    pub fn controlled_mut(&mut self) -> Option<&mut Entity> {
        self.entities.first_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_entity_is_controlled() {
        let mut world = World::new();
        assert!(world.controlled().is_none());

        world.push(Entity::new(1.0, 2.0, 10.0, 10.0));
        world.push(Entity::new(5.0, 5.0, 4.0, 4.0));
        assert_eq!(world.controlled().unwrap().x, 1.0);

        world.remove(0);
        assert_eq!(world.controlled().unwrap().x, 5.0);
        assert_eq!(world.remove(3), None);
    }

    #[test]
    fn test_entity_sits_at_world_corner() {
        let world = World::with_test_entity();
        let e = world.controlled().unwrap();
        assert_eq!((e.x, e.y), (WORLD_SIZE, WORLD_SIZE));
        assert_eq!(e.radius(), 25.0);
    }
}
