//! End-to-end campaign scenarios.

mod campaign;
mod live;
