pub mod available_model;
pub mod cost_log;
pub mod document_class;
pub mod dynamic_step;
pub mod feedback;
pub mod feedback_analysis;
pub mod job;
pub mod ocr_configuration;
pub mod step_execution;
pub mod system_setting;
