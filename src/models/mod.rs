pub mod appointment;
pub mod doctor;
pub mod enums;
pub mod procedure;

pub use appointment::*;
pub use doctor::*;
pub use procedure::*;
