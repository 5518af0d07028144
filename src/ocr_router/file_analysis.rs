use crate::models::enums::MimeClass;

/// Lightweight probing result used to pick an extraction strategy. Derived
/// once per file before any expensive OCR/vision call is made.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub mime_class: MimeClass,
    /// Fraction of the document covered by embedded (selectable) text, PDFs only.
    pub embedded_text_coverage: f64,
    pub has_complex_tables: bool,
    pub is_form: bool,
    pub image_quality: Option<ImageQuality>,
}

#[derive(Debug, Clone)]
pub struct ImageQuality {
    pub resolution_dpi: u32,
    pub blur_variance: f64,
    pub contrast: f64,
}

impl FileAnalysis {
    pub fn pdf_with_embedded_text(coverage: f64, has_complex_tables: bool) -> Self {
        Self {
            mime_class: MimeClass::Pdf,
            embedded_text_coverage: coverage,
            has_complex_tables,
            is_form: false,
            image_quality: None,
        }
    }

    pub fn scanned(mime_class: MimeClass, quality: ImageQuality, has_complex_tables: bool, is_form: bool) -> Self {
        Self {
            mime_class,
            embedded_text_coverage: 0.0,
            has_complex_tables,
            is_form,
            image_quality: Some(quality),
        }
    }

    pub fn is_good_quality(&self) -> bool {
        match &self.image_quality {
            None => true,
            Some(q) => q.resolution_dpi >= 150 && q.blur_variance >= 100.0 && q.contrast >= 0.3,
        }
    }

    /// Cheap byte-level probe run ahead of any extraction call. PDFs are
    /// classified by how much of the file looks like a literal text layer
    /// versus compressed binary streams, and by the standard `/AcroForm`
    /// marker; images get no true quality signal without a decoder, so they
    /// fall back to a size-based proxy advisory only, never a hard gate.
    pub fn detect(mime_class: MimeClass, bytes: &[u8]) -> Self {
        match mime_class {
            MimeClass::Pdf => {
                let printable = bytes.iter().filter(|b| b.is_ascii_graphic() || b.is_ascii_whitespace()).count();
                let coverage = if bytes.is_empty() { 0.0 } else { printable as f64 / bytes.len() as f64 };
                let is_form = bytes.windows(9).any(|w| w == b"/AcroForm");
                Self {
                    mime_class,
                    embedded_text_coverage: coverage,
                    has_complex_tables: false,
                    is_form,
                    image_quality: None,
                }
            }
            MimeClass::Image => {
                let quality = ImageQuality {
                    resolution_dpi: if bytes.len() > 500_000 { 300 } else { 96 },
                    blur_variance: if bytes.len() > 200_000 { 150.0 } else { 60.0 },
                    contrast: 0.5,
                };
                Self {
                    mime_class,
                    embedded_text_coverage: 0.0,
                    has_complex_tables: false,
                    is_form: false,
                    image_quality: Some(quality),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_with_form_marker_is_detected_as_a_form() {
        let bytes = b"%PDF-1.4\n1 0 obj << /AcroForm 2 0 R >> endobj".to_vec();
        let analysis = FileAnalysis::detect(MimeClass::Pdf, &bytes);
        assert!(analysis.is_form);
    }

    #[test]
    fn all_ascii_pdf_has_near_full_text_coverage() {
        let bytes = b"%PDF-1.4\nBT /F1 12 Tf (hello world) Tj ET".to_vec();
        let analysis = FileAnalysis::detect(MimeClass::Pdf, &bytes);
        assert!(analysis.embedded_text_coverage > 0.9);
    }

    #[test]
    fn small_image_gets_a_conservative_quality_proxy() {
        let analysis = FileAnalysis::detect(MimeClass::Image, &vec![0u8; 10_000]);
        let quality = analysis.image_quality.unwrap();
        assert_eq!(quality.resolution_dpi, 96);
    }
}
