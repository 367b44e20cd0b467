//! Deterministic canonicalization of BOM component descriptions.
//!
//! Takes a free-text description (typically a supplier's or an enrichment
//! suggestion) and rewrites it into the house shorthand: part numbers
//! stripped, units attached (`50R`, `1.8K`, `39PF`), capacitance rescaled
//! to the `MF`/`PF` convention, mounting type inferred from package
//! vocabulary, and IC packages written family-first (`SOIC-8`).
//!
//! The whole pipeline is pure string-to-string and idempotent: feeding an
//! already-canonical description back through produces the same text.

mod passes;
mod rules;

use tracing::{debug, instrument};

use bomenrich_shared::NO_PART_NUMBER;

/// Canonicalize a component description.
///
/// Applies the passes in order:
/// 1. Strip every occurrence of `part_number` (case-insensitive)
/// 2. Drop noise words, collapse whitespace
/// 3. Normalize `±` signs and tolerance ranges
/// 4. Resistance units → attached `R`/`K`/`M`
/// 5. Capacitance units → `MF`/`PF` convention
/// 6. Infer mounting type (`SMT`/`TH`) from package vocabulary
/// 7. IC packages → family-first (`8-PIN DIP` → `DIP-8`)
/// 8. Attach remaining numerals to their units (`50 V` → `50V`)
///
/// An empty description or the no-part-number placeholder is returned
/// unchanged; there is nothing to normalize and the marker must survive
/// for upstream reporting.
#[instrument(skip_all)]
pub fn canonicalize(description: &str, part_number: &str) -> String {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.eq_ignore_ascii_case(NO_PART_NUMBER) {
        return description.to_string();
    }

    let result = passes::run_pipeline(trimmed, part_number);
    if result != trimmed {
        debug!(before = %trimmed, after = %result, "description canonicalized");
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // --- Unit conversion table ---

    #[test]
    fn resistance_units() {
        assert_eq!(canonicalize("50 OHM", ""), "50R");
        assert_eq!(canonicalize("1.8 KOHM", ""), "1.8K");
        assert_eq!(canonicalize("81 MOHM", ""), "81M");
    }

    #[test]
    fn capacitance_units() {
        assert_eq!(canonicalize("1 UF", ""), "1MF");
        assert_eq!(canonicalize("150 NF", ""), "0.15MF");
        assert_eq!(canonicalize("100 NF", ""), "0.1MF");
        assert_eq!(canonicalize("1 NF", ""), "1000PF");
        assert_eq!(canonicalize("0.01 NF", ""), "10PF");
    }

    #[test]
    fn trailing_zeros_trimmed() {
        assert_eq!(canonicalize("1.0 UF", ""), "1MF");
        assert_eq!(canonicalize("0.150 UF", ""), "0.15MF");
    }

    // --- Mounting type ---

    #[test]
    fn chip_size_implies_smt() {
        let result = canonicalize("RES 10K 0402", "");
        assert!(result.ends_with("SMT"), "got {result:?}");
    }

    #[test]
    fn dip_implies_th() {
        let result = canonicalize("IC TIMER DIP", "");
        assert!(result.ends_with("TH"), "got {result:?}");
    }

    #[test]
    fn smd_rewritten_to_smt() {
        let result = canonicalize("CAP 1MF SMD", "");
        assert!(result.contains("SMT"), "got {result:?}");
        assert!(!result.contains("SMD"), "got {result:?}");
    }

    // --- Part-number stripping ---

    #[test]
    fn part_number_never_survives() {
        let cases = [
            ("CAP GRM155 10PF", "GRM155"),
            ("cap grm155 10pf GRM155", "grm155"),
            ("RES RC0402-103 10K 0402", "RC0402-103"),
        ];
        for (description, part_number) in cases {
            let result = canonicalize(description, part_number);
            assert!(
                !result
                    .to_ascii_uppercase()
                    .contains(&part_number.to_ascii_uppercase()),
                "{part_number:?} survived in {result:?}"
            );
        }
    }

    // --- Sentinels ---

    #[test]
    fn empty_description_passes_through() {
        assert_eq!(canonicalize("", "X123"), "");
        assert_eq!(canonicalize("   ", "X123"), "");
    }

    #[test]
    fn no_part_number_marker_untouched() {
        let marker = "NO PART NUMBER AVAILABLE";
        assert_eq!(canonicalize(marker, "X123"), marker);
        assert_eq!(
            canonicalize("No Part Number Available", "X123"),
            "No Part Number Available"
        );
    }

    // --- Idempotence ---

    #[test]
    fn canonical_output_is_stable() {
        let cases = [
            ("CAP CHIP CER 39 PF 50 V 2% COG 0402", "X123"),
            ("RES 1.8 KOHM 1% 0603 SMD", "RC123-456"),
            ("IC 555 TIMER 8-PIN DIP", "NE555"),
            ("ATTEN CHIP DC-18GHz 3 DB", "TS0503W3"),
            ("CAP 150 NF 50V X7R", "GRM31"),
        ];
        for (description, part_number) in cases {
            let once = canonicalize(description, part_number);
            let twice = canonicalize(&once, part_number);
            assert_eq!(twice, once, "not stable for {description:?}");
        }
    }

    // --- Whole-pipeline scenarios ---

    #[test]
    fn attenuator_description_normalized() {
        assert_eq!(
            canonicalize("ATTEN CHIP DC-18GHz 3 DB", "TS0503W3"),
            "ATTEN DC-18GHz 3DB"
        );
    }

    #[test]
    fn already_canonical_description_unchanged() {
        let canonical = "CAP CRM 39PF 50V 2% COG 0402 SMT";
        assert_eq!(canonicalize(canonical, "X123"), canonical);
    }

    #[test]
    fn raw_capacitor_row_fully_normalized() {
        assert_eq!(
            canonicalize("CAP CHIP CER 39 PF 50 V 2% COG 0402", "X123"),
            "CAP CER 39PF 50V 2% COG 0402 SMT"
        );
    }

    #[test]
    fn tolerance_range_and_units_combined() {
        assert_eq!(
            canonicalize("ATTEN ±0.5-±9.5 DB 50 OHM", "PE4302"),
            "ATTEN 0.5-9.5DB 50R"
        );
    }
}
