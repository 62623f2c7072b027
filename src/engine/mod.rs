mod core;

pub use core::StressEngine;
