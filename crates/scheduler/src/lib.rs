pub mod scheduler;


pub use scheduler::{BatchReport, BatchScheduler, ExecutionStrategy, SchedulerSettings};
