// src/state/mod.rs
//! Intercept states and the LIFO stack tracking them
//!
//! - **intercept_state**: one session's hook snapshot and registry stash
//! - **stack**: LIFO push/unwind/clear over active states

pub mod intercept_state;
pub mod stack;

// Re-export commonly used types
pub use intercept_state::InterceptState;
pub use stack::InterceptStack;
