//! Render Graph System
//!
//! An ordered list of full-screen passes over image resources, the uniform
//! data blocks they read, and the executor that runs them once per frame.

pub mod data;
pub mod executor;
pub mod graph;
pub mod pass;

pub use data::*;
pub use executor::*;
pub use graph::*;
pub use pass::*;
