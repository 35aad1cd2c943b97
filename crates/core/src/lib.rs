#![forbid(unsafe_code)]

pub mod model;
pub mod retrieval;
pub mod time;

pub use time::Clock;
