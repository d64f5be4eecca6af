//! Controller layer: input events, reducer-style status transitions, and prompt dispatch.

pub mod events;
pub mod orchestration;
pub mod reducer;
