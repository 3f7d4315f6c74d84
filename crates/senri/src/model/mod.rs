mod playlist;
mod segment;

pub use playlist::*;
pub use segment::*;
