//! Project queue backends.

pub mod jsonl;
pub mod memory;

pub use jsonl::{JsonlQueue, JsonlQueueFactory};
pub use memory::{InMemoryQueue, InMemoryQueueFactory};
