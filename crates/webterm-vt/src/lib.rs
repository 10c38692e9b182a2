//! webterm-vt: Terminal emulation engine for webterm.
//!
//! Parses child-process output with `vte`, maintains a fixed-size cell grid
//! with cursor state, queues replies to status queries, and renders the grid
//! either in full or as a diff of the cells changed since the last rendering.

pub mod cell;
pub mod grid;
mod perform;
pub mod screen;
pub mod terminal;

pub use cell::{Cell, CellFlags, Color, Rgb};
pub use grid::Grid;
pub use screen::{CellUpdate, CursorState, RenderedState};
pub use terminal::Terminal;
