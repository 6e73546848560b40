//! Drag gesture recognition: turns pointer and key input into drop intents.
//!
//! [`GestureSession`] is a framework-agnostic state machine. A rendering
//! adapter feeds it [`GestureInput`]s (with hit-testing already done, i.e. the
//! adapter says which item or container is under the pointer) and receives
//! [`GestureEvent`]s.
//!
//! # State Machine
//!
//! ```text
//! Idle ──down──▶ Pressed ──move ≥ threshold──▶ Dragging ⇄ Hovering(target)
//!   ▲               │                              │
//!   │            up (click)               up / Escape
//!   └───────────────┴──────────── Dropped | Cancelled
//! ```
//!
//! # Invariants
//!
//! 1. A press released before the pointer travels `drag_threshold` is a
//!    `Click`, never a drop.
//! 2. `Cancelled` is emitted only for a drag that actually started.
//! 3. The session never touches the tree or the backend; a cancelled drag has
//!    no side effects at all.
//! 4. After `reset()` the session is `Idle` and emits nothing.
//!
//! Keyboard nudges do not go through this state machine.

use serde::{Deserialize, Serialize};

use crate::id::ID;
use crate::reorder::{DropIntent, DropTarget};

/// Thresholds for gesture recognition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Minimum manhattan distance (pointer units) before a press becomes a
    /// drag (default: 5).
    pub drag_threshold: u16,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self { drag_threshold: 5 }
    }
}

/// Pointer position in whatever units the adapter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(self, other: Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

/// Raw input, already hit-tested by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureInput {
    /// Pointer pressed on a drag handle.
    PointerDown {
        item: ID,
        source: ID,
        position: Position,
    },
    PointerMove {
        position: Position,
        over: Option<DropTarget>,
    },
    PointerUp {
        position: Position,
        over: Option<DropTarget>,
    },
    Escape,
}

/// Where the session currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    /// Pointer is down but has not yet moved far enough to start a drag.
    Pressed {
        item: ID,
        source: ID,
        origin: Position,
    },
    Dragging {
        item: ID,
        source: ID,
    },
    Hovering {
        item: ID,
        source: ID,
        target: DropTarget,
    },
}

/// Semantic output of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureEvent {
    Click { item: ID },
    DragStart { item: ID, source: ID },
    /// The candidate target changed; `None` means nothing valid is under the pointer.
    HoverChanged { target: Option<DropTarget> },
    Dropped(DropIntent),
    Cancelled { item: ID },
}

/// Stateful drag recognizer.
#[derive(Debug, Default)]
pub struct GestureSession {
    config: GestureConfig,
    state: GestureState,
}

impl GestureSession {
    #[must_use]
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            state: GestureState::Idle,
        }
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    /// Whether a drag has started and not yet ended.
    pub fn is_dragging(&self) -> bool {
        matches!(
            self.state,
            GestureState::Dragging { .. } | GestureState::Hovering { .. }
        )
    }

    /// Returns to `Idle` without emitting anything (e.g. on focus loss).
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
    }

    /// Process one input, returning the semantic events it produced.
    pub fn process(&mut self, input: GestureInput) -> Vec<GestureEvent> {
        let mut out = Vec::with_capacity(2);
        let state = std::mem::take(&mut self.state);

        self.state = match (state, input) {
            // A new press always starts over, ending any drag in progress
            (
                previous,
                GestureInput::PointerDown {
                    item,
                    source,
                    position,
                },
            ) => {
                if let GestureState::Dragging { item, .. } | GestureState::Hovering { item, .. } =
                    previous
                {
                    out.push(GestureEvent::Cancelled { item });
                }
                GestureState::Pressed {
                    item,
                    source,
                    origin: position,
                }
            }

            (GestureState::Idle, _) => GestureState::Idle,

            (
                GestureState::Pressed {
                    item,
                    source,
                    origin,
                },
                GestureInput::PointerMove { position, over },
            ) => {
                if origin.manhattan_distance(position) < u32::from(self.config.drag_threshold) {
                    GestureState::Pressed {
                        item,
                        source,
                        origin,
                    }
                } else {
                    out.push(GestureEvent::DragStart {
                        item: item.clone(),
                        source: source.clone(),
                    });
                    Self::hover(item, source, None, over, &mut out)
                }
            }
            (GestureState::Pressed { item, .. }, GestureInput::PointerUp { .. }) => {
                out.push(GestureEvent::Click { item });
                GestureState::Idle
            }
            (GestureState::Pressed { .. }, GestureInput::Escape) => GestureState::Idle,

            (GestureState::Dragging { item, source }, GestureInput::PointerMove { over, .. }) => {
                Self::hover(item, source, None, over, &mut out)
            }
            (
                GestureState::Hovering {
                    item,
                    source,
                    target,
                },
                GestureInput::PointerMove { over, .. },
            ) => Self::hover(item, source, Some(target), over, &mut out),

            (
                GestureState::Dragging { item, source } | GestureState::Hovering { item, source, .. },
                GestureInput::PointerUp { over, .. },
            ) => {
                match Self::valid_target(&item, over) {
                    Some(target) => out.push(GestureEvent::Dropped(DropIntent {
                        item,
                        source,
                        target,
                    })),
                    None => out.push(GestureEvent::Cancelled { item }),
                }
                GestureState::Idle
            }
            (
                GestureState::Dragging { item, .. } | GestureState::Hovering { item, .. },
                GestureInput::Escape,
            ) => {
                out.push(GestureEvent::Cancelled { item });
                GestureState::Idle
            }
        };

        out
    }

    /// Dropping an item onto itself is the same as dropping it nowhere.
    fn valid_target(item: &ID, over: Option<DropTarget>) -> Option<DropTarget> {
        match over {
            Some(DropTarget::Item(ref id)) if id == item => None,
            other => other,
        }
    }

    fn hover(
        item: ID,
        source: ID,
        current: Option<DropTarget>,
        over: Option<DropTarget>,
        out: &mut Vec<GestureEvent>,
    ) -> GestureState {
        let next = Self::valid_target(&item, over);
        if next != current {
            out.push(GestureEvent::HoverChanged {
                target: next.clone(),
            });
        }
        match next {
            Some(target) => GestureState::Hovering {
                item,
                source,
                target,
            },
            None => GestureState::Dragging { item, source },
        }
    }
}
