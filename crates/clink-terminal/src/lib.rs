//! Terminal backend abstraction: raw-mode lifecycle, a restartable ECMA-48
//! escape-sequence parser, character-cell attributes, a screen buffer, and
//! the xterm key-sequence encoder.

pub mod attributes;
pub mod backend;
pub mod capabilities;
pub mod ecma48;
pub mod keys;
pub mod screen;

pub use attributes::{Attributes, Color};
pub use backend::{CrosstermBackend, TerminalBackend, TerminalGuard};
pub use capabilities::TerminalCapabilities;
pub use ecma48::{Code, CodeType, CsiParams, Ecma48Iter, Ecma48State, cell_count, parse_all};
pub use screen::{Cell, ScreenBuffer, Writer};
