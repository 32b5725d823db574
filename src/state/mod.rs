//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `TaskState`: the lifecycle of a task (new, running, completed, failed, timeout)
//! - `TaskAction` / `RefType`: what a task does and what it points at
//! - `expiry`: the staleness rule that makes settled tasks eligible again

pub mod expiry;
mod task_state;

// Re-export main types
pub use expiry::{expiry_threshold, is_expired};
pub use task_state::{RefType, TaskAction, TaskState};
