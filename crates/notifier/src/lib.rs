pub mod broker;
pub mod publisher;
pub mod retention;
