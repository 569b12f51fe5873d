//! Prompts for the vision-model signature detector.
//!
//! Keeping the prompt text here means detection behaviour can be tuned
//! without touching the retry and parsing logic in
//! [`crate::pipeline::vision`], and unit tests can inspect it directly.

/// System prompt asking for handwritten-signature boxes as strict JSON.
pub const SIGNATURE_DETECTION_PROMPT: &str = r#"You locate handwritten signatures on scanned document pages.

Rules:

1. WHAT COUNTS
   - Handwritten signatures and handwritten initials written as a signature
   - Include the full extent of the ink, including flourishes that cross printed lines

2. WHAT DOES NOT COUNT
   - Printed names, typed signature blocks, "/s/" markers
   - Stamps, seals, logos, checkboxes, handwritten dates or form entries

3. COORDINATES
   - Report pixel coordinates in the image you were given
   - Origin is the top-left corner; x grows right, y grows down
   - x1,y1 is the top-left corner of the box, x2,y2 the bottom-right corner

4. OUTPUT FORMAT
   - Output ONLY a JSON object, no commentary and no code fences
   - Schema: {"signatures": [{"x1": number, "y1": number, "x2": number, "y2": number, "confidence": number}]}
   - confidence is between 0 and 1
   - If there is no signature, output {"signatures": []}"#;

/// User turn accompanying the page image.
pub fn detection_request(width: u32, height: u32) -> String {
    format!(
        "The attached page image is {width}x{height} pixels. Return every handwritten signature on it."
    )
}
