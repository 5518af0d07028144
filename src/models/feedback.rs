use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::FeedbackAnalysisStatus;

/// Append-only record keyed by `processing_id`. If `data_consent_given` is false,
/// the job's content fields must be cleared within the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub processing_id: Uuid,
    pub overall_rating: i32,
    pub detailed_ratings: Option<serde_json::Value>,
    pub comment: Option<String>,
    pub data_consent_given: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedback {
    pub processing_id: Uuid,
    pub overall_rating: i32,
    pub detailed_ratings: Option<serde_json::Value>,
    pub comment: Option<String>,
    pub data_consent_given: bool,
}

impl NewFeedback {
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        if !(1..=5).contains(&self.overall_rating) {
            return Err(crate::error::AppError::Validation(
                "overall_rating must be between 1 and 5".into(),
            ));
        }
        Ok(())
    }
}

/// Persisted result of the feedback analyzer's quality report, one row per feedback entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    pub feedback_id: i64,
    pub status: FeedbackAnalysisStatus,
    pub pii_leaks: Vec<String>,
    pub translation_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub overall_score: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_out_of_range_is_rejected() {
        let fb = NewFeedback {
            processing_id: Uuid::new_v4(),
            overall_rating: 6,
            detailed_ratings: None,
            comment: None,
            data_consent_given: true,
        };
        assert!(fb.validate().is_err());
    }

    #[test]
    fn rating_in_range_is_accepted() {
        let fb = NewFeedback {
            processing_id: Uuid::new_v4(),
            overall_rating: 3,
            detailed_ratings: None,
            comment: None,
            data_consent_given: false,
        };
        assert!(fb.validate().is_ok());
    }
}
