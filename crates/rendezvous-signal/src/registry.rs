//! Process-wide room registry

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::RelayError;
use crate::room::Room;

/// Active rooms by id
///
/// Sharded, so lookups for one room never wait on writes to another.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rooms.contains_key(id)
    }

    /// Register `room` under its id; the first registration of an id wins
    pub fn register(&self, room: Arc<Room>) -> Result<(), RelayError> {
        match self.rooms.entry(room.id().to_string()) {
            Entry::Occupied(_) => Err(RelayError::RoomExists(room.id().to_string())),
            Entry::Vacant(slot) => {
                debug!("Room registered: {}", room.id());
                slot.insert(room);
                Ok(())
            }
        }
    }

    /// Remove whatever room is registered under `id`
    pub fn remove(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.remove(id).map(|(_, room)| room)
    }

    /// Remove `room` only if it is still the one registered under its id
    pub fn remove_room(&self, room: &Arc<Room>) -> bool {
        self.rooms
            .remove_if(room.id(), |_, registered| Arc::ptr_eq(registered, room))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Total stream sessions across all rooms
    pub fn session_count(&self) -> usize {
        self.rooms.iter().map(|r| r.value().session_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use std::time::Duration;

    fn make_room(id: &str) -> Arc<Room> {
        let (operator, _rx) = channel(8, Duration::from_secs(1));
        Room::new(id.to_string(), operator)
    }

    #[test]
    fn test_register_and_get() {
        let registry = RoomRegistry::new();
        let room = make_room("123456");
        registry.register(Arc::clone(&room)).unwrap();

        let found = registry.get("123456").unwrap();
        assert!(Arc::ptr_eq(&found, &room));
        assert!(registry.get("999999").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_register_keeps_first() {
        let registry = RoomRegistry::new();
        let first = make_room("123456");
        let second = make_room("123456");

        registry.register(Arc::clone(&first)).unwrap();
        assert!(matches!(
            registry.register(second),
            Err(RelayError::RoomExists(id)) if id == "123456"
        ));
        assert!(Arc::ptr_eq(&registry.get("123456").unwrap(), &first));
    }

    #[test]
    fn test_stale_remove_leaves_new_room() {
        let registry = RoomRegistry::new();
        let old = make_room("123456");
        registry.register(Arc::clone(&old)).unwrap();
        assert!(registry.remove_room(&old));

        let new = make_room("123456");
        registry.register(Arc::clone(&new)).unwrap();

        // A late teardown of the old room must not evict its successor.
        assert!(!registry.remove_room(&old));
        assert!(Arc::ptr_eq(&registry.get("123456").unwrap(), &new));
    }

    #[test]
    fn test_remove_by_id() {
        let registry = RoomRegistry::new();
        registry.register(make_room("abc")).unwrap();
        assert!(registry.remove("abc").is_some());
        assert!(registry.remove("abc").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_register_single_winner() {
        let registry = Arc::new(RoomRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register(make_room("race")).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
