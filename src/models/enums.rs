//! Closed sum types for every tagged state in the data model, each backed by a
//! stable string representation for storage and wire serialization.

/// Generates `as_str()` / `Display` / `FromStr` for a closed string-backed enum,
/// so database columns and JSON wire values share one canonical spelling.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::db::DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($str => Ok(Self::$variant),)+
                    other => Err(crate::db::DatabaseError::InvalidEnum {
                        field: stringify!($name).to_string(),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

str_enum!(JobStatus {
    Pending => "PENDING",
    Queued => "QUEUED",
    Running => "RUNNING",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
    Timeout => "TIMEOUT",
    Terminated => "TERMINATED",
});

impl JobStatus {
    /// Terminal states never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::Cancelled
                | JobStatus::Timeout
                | JobStatus::Terminated
        )
    }
}

/// The public-facing status enum returned by `GET /api/process/{id}/status`,
/// distinct from the internal `JobStatus` so the wire shape can evolve independently.
str_enum!(ApiStatus {
    Pending => "pending",
    ExtractingText => "extracting_text",
    Translating => "translating",
    LanguageTranslating => "language_translating",
    Completed => "completed",
    Error => "error",
    Terminated => "terminated",
});

str_enum!(StepStatus {
    Pending => "PENDING",
    Running => "RUNNING",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Skipped => "SKIPPED",
});

str_enum!(OcrEngine {
    LocalText => "LOCAL_TEXT",
    LocalOcr => "LOCAL_OCR",
    VisionLlm => "VISION_LLM",
    Hybrid => "HYBRID",
});

str_enum!(MimeClass {
    Pdf => "pdf",
    Image => "image",
});

str_enum!(CircuitState {
    Closed => "CLOSED",
    Open => "OPEN",
    HalfOpen => "HALF_OPEN",
});

str_enum!(FeedbackAnalysisStatus {
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Skipped => "SKIPPED",
    Failed => "FAILED",
});
