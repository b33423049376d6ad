//! Runtime system
//!
//! This module contains job representation, buffer views, completion handles,
//! the cooperative host loop and the adaptive scheduler.

pub mod buffer;
pub mod error;
pub mod handle;
pub mod host;
pub mod job;
pub mod scheduler;
