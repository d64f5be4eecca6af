//! Console rendering of controller state.

pub mod render;
