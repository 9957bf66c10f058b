pub mod dates;
pub mod size;

pub use dates::*;
pub use size::*;
