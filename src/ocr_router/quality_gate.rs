//! Advisory composite quality score for OCR inputs. A low score never blocks
//! processing — it only surfaces `quality_issues` and `suggestions`.

use super::file_analysis::FileAnalysis;

#[derive(Debug, Clone)]
pub struct QualityReport {
    pub score: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

pub fn assess(analysis: &FileAnalysis) -> QualityReport {
    let Some(quality) = &analysis.image_quality else {
        return QualityReport {
            score: (0.5 + analysis.embedded_text_coverage * 0.5).min(1.0),
            issues: Vec::new(),
            suggestions: Vec::new(),
        };
    };

    let mut score = 1.0;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    if quality.resolution_dpi < 150 {
        score -= 0.3;
        issues.push("low resolution".to_string());
        suggestions.push("rescan at 300 DPI or higher".to_string());
    }
    if quality.blur_variance < 100.0 {
        score -= 0.25;
        issues.push("image appears blurry".to_string());
        suggestions.push("hold the camera steady or use a flatbed scanner".to_string());
    }
    if quality.contrast < 0.3 {
        score -= 0.2;
        issues.push("low contrast".to_string());
        suggestions.push("improve lighting before scanning".to_string());
    }
    if analysis.has_complex_tables {
        issues.push("complex tables detected".to_string());
    }

    QualityReport {
        score: score.clamp(0.0, 1.0),
        issues,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::MimeClass;
    use crate::ocr_router::file_analysis::ImageQuality;

    #[test]
    fn good_quality_image_has_no_issues() {
        let analysis = FileAnalysis::scanned(
            MimeClass::Image,
            ImageQuality { resolution_dpi: 300, blur_variance: 200.0, contrast: 0.6 },
            false,
            false,
        );
        let report = assess(&analysis);
        assert!(report.issues.is_empty());
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn low_quality_image_surfaces_issues_but_still_scores() {
        let analysis = FileAnalysis::scanned(
            MimeClass::Image,
            ImageQuality { resolution_dpi: 72, blur_variance: 30.0, contrast: 0.1 },
            false,
            false,
        );
        let report = assess(&analysis);
        assert!(report.score < 0.5);
        assert_eq!(report.issues.len(), 3);
        assert_eq!(report.suggestions.len(), 3);
    }
}
