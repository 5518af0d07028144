//! Post-completion feedback intake and the quality analyzer it can trigger.

pub mod analyzer;

pub use analyzer::FeedbackAnalyzer;
