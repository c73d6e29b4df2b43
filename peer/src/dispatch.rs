//! Tag registry that turns received text into handler calls.

use log::warn;
use shared::protocol::{split_message, WireMessage};
use shared::{PlayerId, Role};
use simulation::World;
use std::collections::HashMap;

/// Handler for one decoded message: the world, who sent it, and the record.
pub type HandlerFn<M> = fn(&mut World, &PlayerId, M);

type BoxedHandler = Box<dyn Fn(&mut World, &PlayerId, &[&str])>;

/// Maps each tag to the handler for the local role. Both role handlers are
/// supplied at registration; only the one this peer will ever run is kept.
pub struct Dispatcher {
    role: Role,
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl Dispatcher {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            handlers: HashMap::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn register<M: WireMessage + 'static>(
        &mut self,
        on_host: HandlerFn<M>,
        on_client: HandlerFn<M>,
    ) {
        let handler = match self.role {
            Role::Host => on_host,
            Role::Client => on_client,
        };
        let boxed: BoxedHandler = Box::new(move |world: &mut World, sender: &PlayerId, tokens: &[&str]| {
            handler(world, sender, M::decode(tokens))
        });
        if self.handlers.insert(M::TAG, boxed).is_some() {
            warn!("Handler for {} registered twice; keeping the last one", M::TAG);
        }
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Decodes `text` and runs its handler. Returns the tag handled, or
    /// `None` for tags this peer does not know.
    pub fn dispatch(&self, world: &mut World, sender: &PlayerId, text: &str) -> Option<&'static str> {
        let (tag, tokens) = split_message(text);
        let (tag, handler) = self.handlers.get_key_value(tag)?;
        handler(world, sender, tokens.as_slice());
        Some(*tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::ReadyMsg;
    use shared::Color;

    fn mark_ready(world: &mut World, _sender: &PlayerId, msg: ReadyMsg) {
        if let Some(local) = world.players_mut().local_player_mut() {
            local.is_ready = msg.is_ready;
        }
    }

    fn mark_unready(world: &mut World, _sender: &PlayerId, _msg: ReadyMsg) {
        if let Some(local) = world.players_mut().local_player_mut() {
            local.is_ready = false;
        }
    }

    fn world(role: Role) -> World {
        World::new(PlayerId::new("1"), "p", Color::default(), role, 1)
    }

    fn local_ready(world: &World) -> Option<bool> {
        world.players().local_player().map(|p| p.is_ready)
    }

    #[test]
    fn test_role_selects_handler() {
        let mut host = Dispatcher::new(Role::Host);
        host.register::<ReadyMsg>(mark_ready, mark_unready);
        let mut w = world(Role::Host);
        assert_eq!(host.dispatch(&mut w, &PlayerId::new("2"), "R|1|1"), Some("R"));
        assert_eq!(local_ready(&w), Some(true));

        let mut client = Dispatcher::new(Role::Client);
        client.register::<ReadyMsg>(mark_ready, mark_unready);
        let mut w = world(Role::Client);
        if let Some(local) = w.players_mut().local_player_mut() {
            local.is_ready = true;
        }
        client.dispatch(&mut w, &PlayerId::new("2"), "R|1|1");
        assert_eq!(local_ready(&w), Some(false));
    }

    #[test]
    fn test_unknown_tag_ignored() {
        let mut dispatcher = Dispatcher::new(Role::Host);
        dispatcher.register::<ReadyMsg>(mark_ready, mark_unready);
        let mut w = world(Role::Host);
        assert_eq!(dispatcher.dispatch(&mut w, &PlayerId::new("2"), "ZZ|1|2|3"), None);
        assert_eq!(dispatcher.dispatch(&mut w, &PlayerId::new("2"), ""), None);
        assert!(dispatcher.is_registered("R"));
        assert!(!dispatcher.is_registered("ZZ"));
    }
}
