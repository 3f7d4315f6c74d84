mod assembler;
pub mod attribute;
pub mod directive;
pub mod lines;
mod parser;
mod reload;
mod tracker;

pub use assembler::assemble;
pub use parser::{parse, parse_bytes};
pub use tracker::SegmentTracker;
