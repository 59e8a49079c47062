//! Grouping, scheduling and reporting of builds.

pub mod report;
pub mod scheduler;
pub mod source;

pub use report::{aggregate, BuildResult, BuildStatus, Report, Timings};
pub use scheduler::{BuildTask, Job, Parallelism, Scheduler};
pub use source::{classify, BuildGroup, BuildMode, BuildOptions, GroupSlot, Language, OptLevel};
