//! Collaborator-facing events
//!
//! Renderers, audio and input layers subscribe here. Handlers for the same
//! event run synchronously in the order they were registered.

use std::collections::HashMap;
use std::fmt;

use super::player::Player;

/// Semantic events fired by the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorldEvent {
    PlayerEnter,
    PlayerExit,
    PlayerAttack,
    PlayerCall,
    PlayerPush,
    /// Carries no player
    GameEnd,
}

type Handler = Box<dyn FnMut(Option<&Player>) + Send>;

/// Ordered subscriber lists per event kind
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<WorldEvent, Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event`
    pub fn subscribe<F>(&mut self, event: WorldEvent, handler: F)
    where
        F: FnMut(Option<&Player>) + Send + 'static,
    {
        self.handlers.entry(event).or_default().push(Box::new(handler));
    }

    /// Invoke every handler of `event` in registration order
    pub fn emit(&mut self, event: WorldEvent, player: Option<&Player>) {
        if let Some(handlers) = self.handlers.get_mut(&event) {
            for handler in handlers.iter_mut() {
                handler(player);
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_handlers_fire_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe(WorldEvent::PlayerEnter, move |p| {
                log.lock().unwrap().push(format!("{}:{}", tag, p.map(|p| p.name.as_str()).unwrap_or("-")));
            });
        }

        let player = Player::new("alice", "a", 0.0, 0);
        bus.emit(WorldEvent::PlayerEnter, Some(&player));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:alice", "second:alice", "third:alice"]
        );
    }

    #[test]
    fn test_events_are_independent() {
        let hits = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();
        let counter = Arc::clone(&hits);
        bus.subscribe(WorldEvent::GameEnd, move |p| {
            assert!(p.is_none());
            *counter.lock().unwrap() += 1;
        });

        bus.emit(WorldEvent::PlayerExit, None);
        bus.emit(WorldEvent::PlayerCall, None);
        bus.emit(WorldEvent::GameEnd, None);

        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
