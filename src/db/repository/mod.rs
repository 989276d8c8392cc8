//! Repository layer — entity-scoped database operations.
//!
//! Free functions over `&rusqlite::Connection`, one sub-module per entity.
//! All public functions are re-exported here.

mod appointment;
mod attachment;
mod doctor;
mod procedure;

pub use appointment::*;
pub use attachment::*;
pub use doctor::*;
pub use procedure::*;
