pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod execution_loop;
pub mod job;
pub mod llm;
pub mod pipeline;
pub mod policy;
pub mod profiler;
pub mod prompts;
pub mod report;
pub mod resolver;
pub mod response;
pub mod store;
pub mod table;
pub mod terms;
pub mod validator;

pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use pipeline::{Diagnostics, Pipeline, PipelineRun};
pub use response::AssistantResponse;
