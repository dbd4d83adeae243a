//! Analysis task contract and the runner that executes tasks.

mod config;
mod preprocess;
mod runner;
mod task;
mod tasks;
mod types;

pub use config::{Sampling, TaskRunnerConfig};
pub use preprocess::{preprocess, PreparedText};
pub use runner::{TaskInput, TaskLimits, TaskRunner};
pub use task::AnalysisTask;
pub use tasks::{build_task, CategoryTask, EntitiesTask, KeywordsTask, SentimentTask};
pub use types::*;
