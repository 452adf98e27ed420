pub mod actor;
pub mod diagnosis;
pub mod enums;
pub mod medication;
pub mod prescription;

pub use actor::*;
pub use diagnosis::*;
pub use medication::*;
pub use prescription::*;
