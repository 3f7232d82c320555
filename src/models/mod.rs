pub mod artifact;
pub mod blog;
pub mod job;
