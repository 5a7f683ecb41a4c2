pub mod bars;
pub mod preview;
