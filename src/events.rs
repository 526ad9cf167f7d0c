use bitflags::bitflags;
use glam::Vec2;
use std::collections::HashMap;
use std::fmt;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const CTRL = 0b001;
        const SHIFT = 0b010;
        const ALT = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Escape,
    Delete,
}

/// Pointer positions are in map screen space; the host maps them to layer cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditorEvent {
    MousePressed { point: Vec2, button: PointerButton },
    MouseDragged { point: Vec2, button: PointerButton },
    MouseMoved { point: Vec2 },
    KeyPressed { key: Key, modifiers: Modifiers },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorEventKind {
    MousePressed,
    MouseDragged,
    MouseMoved,
    KeyPressed,
}

impl EditorEventKind {
    pub const ALL: [EditorEventKind; 4] = [
        EditorEventKind::MousePressed,
        EditorEventKind::MouseDragged,
        EditorEventKind::MouseMoved,
        EditorEventKind::KeyPressed,
    ];
}

impl EditorEvent {
    pub fn kind(&self) -> EditorEventKind {
        match self {
            EditorEvent::MousePressed { .. } => EditorEventKind::MousePressed,
            EditorEvent::MouseDragged { .. } => EditorEventKind::MouseDragged,
            EditorEvent::MouseMoved { .. } => EditorEventKind::MouseMoved,
            EditorEvent::KeyPressed { .. } => EditorEventKind::KeyPressed,
        }
    }
}

impl fmt::Display for EditorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorEvent::MousePressed { point, button } => {
                write!(f, "MousePressed point=({:.1}, {:.1}) button={:?}", point.x, point.y, button)
            }
            EditorEvent::MouseDragged { point, button } => {
                write!(f, "MouseDragged point=({:.1}, {:.1}) button={:?}", point.x, point.y, button)
            }
            EditorEvent::MouseMoved { point } => write!(f, "MouseMoved point=({:.1}, {:.1})", point.x, point.y),
            EditorEvent::KeyPressed { key, modifiers } => {
                write!(f, "KeyPressed key={:?} modifiers={:?}", key, modifiers)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u32);

/// Queues editor input and routes each event kind to its own subscriber list.
#[derive(Default)]
pub struct EditorListener {
    subscribers: HashMap<EditorEventKind, Vec<SubscriberId>>,
    events: Vec<EditorEvent>,
}

impl EditorListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EditorEventKind, id: SubscriberId) {
        let list = self.subscribers.entry(kind).or_default();
        if !list.contains(&id) {
            list.push(id);
        }
    }

    pub fn unsubscribe(&mut self, kind: EditorEventKind, id: SubscriberId) {
        if let Some(list) = self.subscribers.get_mut(&kind) {
            list.retain(|existing| *existing != id);
        }
    }

    pub fn unsubscribe_all(&mut self, id: SubscriberId) {
        for list in self.subscribers.values_mut() {
            list.retain(|existing| *existing != id);
        }
    }

    pub fn is_subscribed(&self, kind: EditorEventKind, id: SubscriberId) -> bool {
        self.subscribers.get(&kind).map(|list| list.contains(&id)).unwrap_or(false)
    }

    pub fn subscribers(&self, kind: EditorEventKind) -> &[SubscriberId] {
        self.subscribers.get(&kind).map(|list| list.as_slice()).unwrap_or(&[])
    }

    pub fn push(&mut self, event: EditorEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<EditorEvent> {
        self.events.drain(..).collect()
    }

    /// Drains queued events for one subscriber, dropping the kinds it is not subscribed to.
    pub fn drain_for(&mut self, id: SubscriberId) -> Vec<EditorEvent> {
        let events = self.drain();
        events.into_iter().filter(|event| self.is_subscribed(event.kind(), id)).collect()
    }
}
