#![doc = include_str!("../README.md")]

pub mod engine;
pub mod error;

pub use engine::Engine;
pub use error::EngineError;
