//! Namespace registry and listener table.

use sockline_frame::Value;

use crate::event::{EventHandler, InboundEvent};

/// Identifies one registered handler.
pub type SubscriptionId = u64;

struct Listener {
    id: SubscriptionId,
    event: String,
    handler: EventHandler,
}

/// An event re-emitted after every successful namespace connect.
#[derive(Debug, Clone, PartialEq)]
pub struct StickyJoin {
    pub event: String,
    pub args: Vec<Value>,
}

/// Per-namespace state.
pub struct NamespaceState {
    name: String,
    connected: bool,
    /// Whether the namespace should be connected on every open.
    joined: bool,
    listeners: Vec<Listener>,
    sticky_joins: Vec<StickyJoin>,
}

impl NamespaceState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            connected: false,
            joined: false,
            listeners: Vec::new(),
            sticky_joins: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn sticky_joins(&self) -> &[StickyJoin] {
        &self.sticky_joins
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// All namespaces known to one client, in first-reference order.
#[derive(Default)]
pub struct NamespaceRegistry {
    namespaces: Vec<NamespaceState>,
    catch_all: Vec<(SubscriptionId, EventHandler)>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing state for `name`, created on first reference.
    pub fn of(&mut self, name: &str) -> &mut NamespaceState {
        let pos = match self.position(name) {
            Some(pos) => pos,
            None => {
                self.namespaces.push(NamespaceState::new(name));
                self.namespaces.len() - 1
            }
        };
        &mut self.namespaces[pos]
    }

    pub fn get(&self, name: &str) -> Option<&NamespaceState> {
        self.position(name).map(|pos| &self.namespaces[pos])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.namespaces.iter().position(|ns| ns.name == name)
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.get(name).is_some_and(NamespaceState::is_connected)
    }

    /// Mark `name` wanted. Returns true if it was not joined before.
    pub fn join(&mut self, name: &str) -> bool {
        let ns = self.of(name);
        !std::mem::replace(&mut ns.joined, true)
    }

    /// Stop re-joining `name` and mark it disconnected. Returns true if it was
    /// connected.
    pub fn leave(&mut self, name: &str) -> bool {
        let ns = self.of(name);
        ns.joined = false;
        std::mem::replace(&mut ns.connected, false)
    }

    /// Names to connect after a transport opens.
    pub fn joined(&self) -> Vec<String> {
        self.namespaces
            .iter()
            .filter(|ns| ns.joined)
            .map(|ns| ns.name.clone())
            .collect()
    }

    /// Append a handler for `event`.
    pub fn on(&mut self, name: &str, event: &str, id: SubscriptionId, handler: EventHandler) {
        self.of(name).listeners.push(Listener {
            id,
            event: event.to_string(),
            handler,
        });
    }

    /// Register a handler that sees every inbound event.
    pub fn on_any(&mut self, id: SubscriptionId, handler: EventHandler) {
        self.catch_all.push((id, handler));
    }

    /// Remove exactly one handler.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        if let Some(pos) = self.catch_all.iter().position(|(sub, _)| *sub == id) {
            self.catch_all.remove(pos);
            return true;
        }
        for ns in &mut self.namespaces {
            if let Some(pos) = ns.listeners.iter().position(|l| l.id == id) {
                ns.listeners.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn add_sticky_join(&mut self, name: &str, event: &str, args: Vec<Value>) {
        self.of(name).sticky_joins.push(StickyJoin {
            event: event.to_string(),
            args,
        });
    }

    /// Mark `name` connected and return the sticky joins to replay.
    pub fn mark_connected(&mut self, name: &str) -> Vec<StickyJoin> {
        let ns = self.of(name);
        ns.connected = true;
        ns.joined = true;
        ns.sticky_joins.clone()
    }

    /// Returns true if `name` was connected.
    pub fn mark_disconnected(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(pos) => std::mem::replace(&mut self.namespaces[pos].connected, false),
            None => false,
        }
    }

    /// Mark every namespace disconnected; listeners and sticky joins stay.
    /// Returns the names that were connected.
    pub fn mark_all_disconnected(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        for ns in &mut self.namespaces {
            if std::mem::replace(&mut ns.connected, false) {
                dropped.push(ns.name.clone());
            }
        }
        dropped
    }

    /// Move listeners, sticky joins and the joined flag from `from` to `to`.
    pub fn rename(&mut self, from: &str, to: &str) {
        let Some(pos) = self.position(from) else {
            self.of(to);
            return;
        };
        let mut old = self.namespaces.remove(pos);
        let target = self.of(to);
        target.listeners.append(&mut old.listeners);
        target.sticky_joins.append(&mut old.sticky_joins);
        target.joined |= old.joined;
    }

    /// Handlers for one inbound event: namespace listeners in registration
    /// order, then catch-all handlers.
    pub fn handlers(&self, name: &str, event: &str) -> Vec<EventHandler> {
        let scoped = self
            .get(name)
            .into_iter()
            .flat_map(|ns| ns.listeners.iter())
            .filter(|listener| listener.event == event)
            .map(|listener| listener.handler.clone());
        let any = self.catch_all.iter().map(|(_, handler)| handler.clone());
        scoped.chain(any).collect()
    }

    /// Invoke every handler for `event`. Returns how many ran.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let handlers = self.handlers(&event.namespace, &event.event);
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}
