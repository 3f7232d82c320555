pub mod content;
pub mod coordinator;
pub mod memory;
pub mod pdf;
pub mod queue;
pub mod result_store;
pub mod worker;
