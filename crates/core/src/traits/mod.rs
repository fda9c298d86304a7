pub mod downstream;

pub use downstream::*;
