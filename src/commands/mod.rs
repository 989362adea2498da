pub mod checkpoint;
pub mod chunk;
pub mod config;
pub mod demo;
pub mod invoke;
