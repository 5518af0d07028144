pub mod available_model;
pub mod cost_log;
pub mod document_class;
pub mod dynamic_step;
pub mod enums;
pub mod feedback;
pub mod job;
pub mod ocr_configuration;
pub mod step_execution;
pub mod system_setting;

pub use available_model::AvailableModel;
pub use cost_log::AiCostLogEntry;
pub use document_class::DocumentClass;
pub use dynamic_step::{DynamicStep, RetryPolicyName, StopCondition};
pub use enums::{ApiStatus, CircuitState, JobStatus, MimeClass, OcrEngine, StepStatus};
pub use feedback::{Feedback, FeedbackAnalysis, NewFeedback};
pub use job::Job;
pub use ocr_configuration::OcrConfiguration;
pub use step_execution::{NewStepExecution, StepExecution};
pub use system_setting::SystemSetting;
