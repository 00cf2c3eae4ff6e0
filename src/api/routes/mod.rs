//! API route modules.

pub mod agents;
pub mod calls;
pub mod health;
