//! Model router — local document analysis and reasoning-tier selection.
//!
//! The analysis never leaves the process: page count and scan detection
//! come from byte-level PDF markers (magic header, text operators), so
//! routing costs nothing. The fast tier is purely a cost optimization
//! for previously-seen, already-disambiguated senders; every uncertain
//! signal falls back to the capable tier.

use serde::{Deserialize, Serialize};

/// Character budget of raw PDF bytes scanned for text operators.
const TEXT_SCAN_BYTES: usize = 256 * 1024;

/// At least this many text operators means a real text layer.
const TEXT_MARKER_THRESHOLD: usize = 3;

/// Documents longer than this route to the capable tier.
pub const PAGE_THRESHOLD: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("document is not a PDF")]
    NotAPdf,
}

/// Reasoning-service tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Expensive, strong vision: scans, long or unfamiliar documents.
    Capable,
    /// Cheap fast path for simple, known documents.
    Fast,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capable => "capable",
            Self::Fast => "fast",
        }
    }
}

/// Locally measured document properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfTraits {
    pub page_count: usize,
    /// No usable text layer, i.e. an image-only scan.
    pub is_image_pdf: bool,
    pub has_text_layer: bool,
    pub file_size_bytes: usize,
}

/// Chosen tier plus a human-readable rationale for logs and the
/// outcome record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub tier: ModelTier,
    pub reason: String,
}

/// Analyze a PDF without rendering it.
///
/// Text-layer detection counts text-showing operators (`BT`, `ET`,
/// `Tj`, `TJ`, `Tf`) in the leading bytes; the operators only appear in
/// digital PDFs. Page count comes from `/Type /Page` object markers,
/// clamped to at least one.
pub fn analyze_pdf(bytes: &[u8]) -> Result<PdfTraits, AnalysisError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(AnalysisError::NotAPdf);
    }

    let head = &bytes[..bytes.len().min(TEXT_SCAN_BYTES)];
    let head_text = String::from_utf8_lossy(head);
    let text_markers = ["BT", "ET", " Tj", " TJ", " Tf"]
        .iter()
        .map(|m| head_text.matches(m).count())
        .sum::<usize>();
    let has_text_layer = text_markers >= TEXT_MARKER_THRESHOLD;

    let traits = PdfTraits {
        page_count: count_pages(bytes),
        is_image_pdf: !has_text_layer,
        has_text_layer,
        file_size_bytes: bytes.len(),
    };
    tracing::debug!(
        pages = traits.page_count,
        image_pdf = traits.is_image_pdf,
        size = traits.file_size_bytes,
        "document analyzed"
    );
    Ok(traits)
}

fn count_pages(bytes: &[u8]) -> usize {
    let content = String::from_utf8_lossy(bytes);
    let count = ["/Type /Page", "/Type/Page"]
        .iter()
        .map(|marker| {
            content
                .match_indices(marker)
                // Exclude the "/Type /Pages" tree node
                .filter(|(idx, m)| content[idx + m.len()..].as_bytes().first() != Some(&b's'))
                .count()
        })
        .sum::<usize>();
    count.max(1)
}

/// Select the reasoning tier for a document.
///
/// `correspondent_known` must mean: the correspondent is set AND the
/// document already carries a pipeline status from an earlier pass. An
/// archive-side auto-matched correspondent on a first-time document is
/// not trustworthy enough to take the cheap path.
pub fn select_tier(
    traits: &PdfTraits,
    correspondent_known: bool,
    expects_stamp: bool,
) -> RoutingDecision {
    if traits.is_image_pdf {
        return RoutingDecision {
            tier: ModelTier::Capable,
            reason: "image-only PDF (scan)".into(),
        };
    }
    if traits.page_count > PAGE_THRESHOLD {
        return RoutingDecision {
            tier: ModelTier::Capable,
            reason: format!(
                "long document ({} pages > {PAGE_THRESHOLD})",
                traits.page_count
            ),
        };
    }
    if !correspondent_known {
        return RoutingDecision {
            tier: ModelTier::Capable,
            reason: "correspondent not established by a previous pass".into(),
        };
    }
    if expects_stamp {
        return RoutingDecision {
            tier: ModelTier::Capable,
            reason: "pagination stamp expected".into(),
        };
    }
    RoutingDecision {
        tier: ModelTier::Fast,
        reason: "known correspondent, short digital document".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal digital PDF: header plus a page with text operators.
    fn digital_pdf(pages: usize) -> Vec<u8> {
        let mut content = String::from("%PDF-1.4\n");
        for i in 0..pages {
            content.push_str(&format!(
                "obj {i} << /Type /Page >>\nBT /F1 12 Tf (hello) Tj ET\n"
            ));
        }
        content.push_str("<< /Type /Pages /Count 1 >>\n%%EOF");
        content.into_bytes()
    }

    /// Scan-like PDF: header and page objects, no text operators.
    fn scanned_pdf(pages: usize) -> Vec<u8> {
        let mut content = String::from("%PDF-1.4\n");
        for i in 0..pages {
            content.push_str(&format!(
                "obj {i} << /Type /Page /XObject /Image >>\nstream...endstream\n"
            ));
        }
        content.push_str("%%EOF");
        content.into_bytes()
    }

    #[test]
    fn non_pdf_rejected() {
        assert!(matches!(
            analyze_pdf(b"plain text file"),
            Err(AnalysisError::NotAPdf)
        ));
    }

    #[test]
    fn digital_pdf_detected() {
        let traits = analyze_pdf(&digital_pdf(2)).unwrap();
        assert!(traits.has_text_layer);
        assert!(!traits.is_image_pdf);
        assert_eq!(traits.page_count, 2);
    }

    #[test]
    fn scanned_pdf_detected() {
        let traits = analyze_pdf(&scanned_pdf(1)).unwrap();
        assert!(!traits.has_text_layer);
        assert!(traits.is_image_pdf);
    }

    #[test]
    fn page_count_ignores_pages_tree_node() {
        let traits = analyze_pdf(&digital_pdf(3)).unwrap();
        assert_eq!(traits.page_count, 3);
    }

    #[test]
    fn page_count_never_zero() {
        let traits = analyze_pdf(b"%PDF-1.4\nnothing else").unwrap();
        assert_eq!(traits.page_count, 1);
    }

    // ── Tier selection ──

    fn traits(pages: usize, image: bool) -> PdfTraits {
        PdfTraits {
            page_count: pages,
            is_image_pdf: image,
            has_text_layer: !image,
            file_size_bytes: 10_000,
        }
    }

    #[test]
    fn scan_routes_to_capable() {
        let decision = select_tier(&traits(1, true), true, false);
        assert_eq!(decision.tier, ModelTier::Capable);
    }

    #[test]
    fn long_document_routes_to_capable() {
        let decision = select_tier(&traits(6, false), true, false);
        assert_eq!(decision.tier, ModelTier::Capable);
    }

    #[test]
    fn unknown_correspondent_routes_to_capable() {
        // An auto-matched correspondent without a prior pipeline status
        // reaches this function as correspondent_known=false.
        let decision = select_tier(&traits(2, false), false, false);
        assert_eq!(decision.tier, ModelTier::Capable);
    }

    #[test]
    fn expected_stamp_routes_to_capable() {
        let decision = select_tier(&traits(2, false), true, true);
        assert_eq!(decision.tier, ModelTier::Capable);
    }

    #[test]
    fn known_simple_document_takes_fast_path() {
        let decision = select_tier(&traits(3, false), true, false);
        assert_eq!(decision.tier, ModelTier::Fast);
    }

    #[test]
    fn boundary_page_count_still_fast() {
        let decision = select_tier(&traits(PAGE_THRESHOLD, false), true, false);
        assert_eq!(decision.tier, ModelTier::Fast);
    }
}
