#![deny(warnings)]

pub mod config;
pub mod emotion;
pub mod feedback;
pub mod generate;
pub mod pipeline;
pub mod sampling;
pub mod source;
pub mod util;
