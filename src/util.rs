//! Shared utility modules used across Quarry components.

pub mod glob;
pub mod hash;
