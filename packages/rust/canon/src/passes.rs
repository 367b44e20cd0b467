//! Canonicalization passes for BOM descriptions.
//!
//! Each pass is a function `&str -> String` applied in a fixed sequence.
//! The order matters: the part number disappears before token rules run,
//! unit rewrites happen before mounting inference can see package tokens,
//! and tightening runs last so it catches units produced by earlier passes.

use crate::rules;

/// Run the full canonicalization pipeline on a trimmed description.
pub(crate) fn run_pipeline(description: &str, part_number: &str) -> String {
    let mut result = description.to_string();

    result = strip_part_number(&result, part_number);
    result = remove_noise_words(&result);
    result = normalize_signs(&result);
    result = normalize_resistance(&result);
    result = normalize_capacitance(&result);
    result = infer_mounting(&result);
    result = reformat_ic_packages(&result);
    result = tighten_units(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Strip the part number
// ---------------------------------------------------------------------------

/// Remove every case-insensitive occurrence of the literal part number.
///
/// Part numbers are ASCII, so the case fold is done with byte-stable ASCII
/// uppercasing and plain substring search rather than a runtime regex.
fn strip_part_number(text: &str, part_number: &str) -> String {
    let needle = part_number.trim().to_ascii_uppercase();
    if needle.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let hay = rest.to_ascii_uppercase();
        match hay.find(&needle) {
            Some(pos) => {
                out.push_str(&rest[..pos]);
                rest = &rest[pos + needle.len()..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Pass 2: Drop noise words, collapse whitespace
// ---------------------------------------------------------------------------

/// Remove filler tokens and rejoin with single spaces.
fn remove_noise_words(text: &str) -> String {
    text.split_whitespace()
        .filter(|token| {
            !rules::NOISE_WORDS
                .iter()
                .any(|noise| token.eq_ignore_ascii_case(noise))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Pass 3: Signs and tolerance ranges
// ---------------------------------------------------------------------------

/// Merge `±A-±B` into `A-B`, reduce `±X` to `X`, strip stray signs.
fn normalize_signs(text: &str) -> String {
    let result = rules::PM_RANGE_RE.replace_all(text, "$1-$2");
    let result = rules::PM_VALUE_RE.replace_all(&result, "$1");
    rules::STRAY_SIGN_RE
        .replace_all(&result, "$1$2")
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Resistance units
// ---------------------------------------------------------------------------

/// Rewrite resistance units to the attached `R`/`K`/`M` shorthand.
fn normalize_resistance(text: &str) -> String {
    let mut result = text.to_string();
    for (pattern, suffix) in rules::RESISTANCE_RULES.iter() {
        result = pattern
            .replace_all(&result, |caps: &regex::Captures| {
                format!("{}{}", &caps[1], suffix)
            })
            .to_string();
    }
    result
}

// ---------------------------------------------------------------------------
// Pass 5: Capacitance units
// ---------------------------------------------------------------------------

/// Rewrite capacitance units.
///
/// `UF` carries its value into `MF` unchanged (domain shorthand, not SI).
/// `NF` rescales: values at or above 100 divide into `MF`, smaller values
/// multiply into `PF`. `PF` just attaches and uppercases.
fn normalize_capacitance(text: &str) -> String {
    let result = rules::UF_RE.replace_all(text, |caps: &regex::Captures| {
        match caps[1].parse::<f64>() {
            Ok(value) => format!("{}MF", format_value(value)),
            Err(_) => caps[0].to_string(),
        }
    });

    let result = rules::NF_RE.replace_all(&result, |caps: &regex::Captures| {
        match caps[1].parse::<f64>() {
            Ok(value) if value >= 100.0 => format!("{}MF", format_value(value / 1000.0)),
            Ok(value) => format!("{}PF", format_value(value * 1000.0)),
            Err(_) => caps[0].to_string(),
        }
    });

    rules::PF_RE
        .replace_all(&result, |caps: &regex::Captures| {
            match caps[1].parse::<f64>() {
                Ok(value) => format!("{}PF", format_value(value)),
                Err(_) => caps[0].to_string(),
            }
        })
        .to_string()
}

/// Format a numeric value without trailing zeros or a dangling point.
fn format_value(value: f64) -> String {
    let formatted = format!("{value:.6}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 6: Mounting type
// ---------------------------------------------------------------------------

/// Normalize `SMD` → `SMT`, then append a mounting suffix when the package
/// vocabulary implies one and none is present yet.
fn infer_mounting(text: &str) -> String {
    let result = rules::SMD_RE.replace_all(text, "SMT").to_string();

    // An explicit mounting type wins over any inference.
    if rules::MOUNT_PRESENT_RE.is_match(&result) {
        return result;
    }

    let has_smt_package =
        rules::SMT_PACKAGE_RE.is_match(&result) || rules::CHIP_SIZE_RE.is_match(&result);
    let has_th_keyword = rules::TH_KEYWORD_RE.is_match(&result);

    if has_th_keyword && !has_smt_package {
        format!("{} TH", result.trim_end())
    } else if has_smt_package {
        format!("{} SMT", result.trim_end())
    } else {
        result
    }
}

// ---------------------------------------------------------------------------
// Pass 7: IC package order
// ---------------------------------------------------------------------------

/// Rewrite `<N>-PIN <FAMILY>` and `<N>-<FAMILY>` into `<FAMILY>-<N>`.
fn reformat_ic_packages(text: &str) -> String {
    let result = rules::PIN_FAMILY_RE.replace_all(text, "$2-$1");
    rules::N_FAMILY_RE.replace_all(&result, "$2-$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 8: Final tightening
// ---------------------------------------------------------------------------

/// Join numerals to their unit tokens and collapse whitespace once more.
fn tighten_units(text: &str) -> String {
    let result = rules::TIGHTEN_RE.replace_all(text, "$1$2");
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_part_number_case_insensitive() {
        let result = strip_part_number("CAP grm155 10PF GRM155", "GRM155");
        assert!(!result.to_ascii_uppercase().contains("GRM155"));
        assert!(result.contains("CAP"));
        assert!(result.contains("10PF"));
    }

    #[test]
    fn strip_part_number_empty_is_noop() {
        assert_eq!(strip_part_number("RES 10K", ""), "RES 10K");
        assert_eq!(strip_part_number("RES 10K", "   "), "RES 10K");
    }

    #[test]
    fn noise_words_removed_and_whitespace_collapsed() {
        assert_eq!(remove_noise_words("CAP  CHIP   CER 39 PF"), "CAP CER 39 PF");
        assert_eq!(remove_noise_words("IND chip 12NH"), "IND 12NH");
    }

    #[test]
    fn noise_word_inside_token_survives() {
        assert_eq!(remove_noise_words("CHIPSET DRIVER"), "CHIPSET DRIVER");
    }

    #[test]
    fn signs_range_merged() {
        assert_eq!(normalize_signs("ATTEN ±2-±8 DB"), "ATTEN 2-8 DB");
        assert_eq!(normalize_signs("±0.5-±9.5DB"), "0.5-9.5DB");
    }

    #[test]
    fn signs_plain_pm_reduced() {
        assert_eq!(normalize_signs("CAP 10PF ±5%"), "CAP 10PF 5%");
        assert_eq!(normalize_signs("TOL +/-1%"), "TOL 1%");
    }

    #[test]
    fn signs_stray_stripped_but_ranges_kept() {
        assert_eq!(normalize_signs("VOLTAGE +5 V"), "VOLTAGE 5 V");
        assert_eq!(normalize_signs("DC-18GHz 2-8GHZ"), "DC-18GHz 2-8GHZ");
    }

    #[test]
    fn resistance_ohm_to_r() {
        assert_eq!(normalize_resistance("50 OHM"), "50R");
        assert_eq!(normalize_resistance("50 OHMS"), "50R");
        assert_eq!(normalize_resistance("50Ω"), "50R");
    }

    #[test]
    fn resistance_kilo_and_mega() {
        assert_eq!(normalize_resistance("1.8 KOHM"), "1.8K");
        assert_eq!(normalize_resistance("81 MOHM"), "81M");
        assert_eq!(normalize_resistance("4.7 kΩ"), "4.7K");
    }

    #[test]
    fn resistance_priority_kohm_not_rematched() {
        // KOHM must not decay into K + OHM→R.
        assert_eq!(normalize_resistance("10 KOHM 1 OHM"), "10K 1R");
    }

    #[test]
    fn capacitance_uf_is_mf_verbatim() {
        assert_eq!(normalize_capacitance("1 UF"), "1MF");
        assert_eq!(normalize_capacitance("4.7 uF"), "4.7MF");
        assert_eq!(normalize_capacitance("0.10 µF"), "0.1MF");
    }

    #[test]
    fn capacitance_nf_large_divides_into_mf() {
        assert_eq!(normalize_capacitance("150 NF"), "0.15MF");
        assert_eq!(normalize_capacitance("100 NF"), "0.1MF");
    }

    #[test]
    fn capacitance_nf_small_multiplies_into_pf() {
        assert_eq!(normalize_capacitance("1 NF"), "1000PF");
        assert_eq!(normalize_capacitance("0.01 NF"), "10PF");
        assert_eq!(normalize_capacitance("99.9 NF"), "99900PF");
    }

    #[test]
    fn capacitance_pf_attaches_uppercase() {
        assert_eq!(normalize_capacitance("39 pF"), "39PF");
        assert_eq!(normalize_capacitance("39PF"), "39PF");
    }

    #[test]
    fn format_value_trims() {
        assert_eq!(format_value(1.0), "1");
        assert_eq!(format_value(0.15), "0.15");
        assert_eq!(format_value(1000.0), "1000");
        assert_eq!(format_value(0.01 * 1000.0), "10");
    }

    #[test]
    fn mounting_existing_type_left_alone() {
        assert_eq!(infer_mounting("RES 10K 0402 SMT"), "RES 10K 0402 SMT");
        assert_eq!(infer_mounting("CONN HEADER TH"), "CONN HEADER TH");
        assert_eq!(
            infer_mounting("CONN HEADER THROUGH HOLE"),
            "CONN HEADER THROUGH HOLE"
        );
    }

    #[test]
    fn mounting_smd_becomes_smt() {
        let result = infer_mounting("CAP 1MF SMD");
        assert!(result.contains("SMT"));
        assert!(!result.contains("SMD"));
    }

    #[test]
    fn mounting_th_keywords_append_th() {
        assert_eq!(infer_mounting("IC TIMER DIP"), "IC TIMER DIP TH");
        assert_eq!(infer_mounting("REG TO-220"), "REG TO-220 TH");
        assert_eq!(infer_mounting("IC CERDIP"), "IC CERDIP TH");
    }

    #[test]
    fn mounting_smt_vocabulary_appends_smt() {
        assert_eq!(infer_mounting("IC OPAMP SOIC-8"), "IC OPAMP SOIC-8 SMT");
        assert_eq!(infer_mounting("RES 10K 0402"), "RES 10K 0402 SMT");
        assert_eq!(infer_mounting("XSTR SOT-23"), "XSTR SOT-23 SMT");
    }

    #[test]
    fn mounting_unknown_package_appends_nothing() {
        assert_eq!(infer_mounting("CAP CER 39PF 50V"), "CAP CER 39PF 50V");
        // 1000 is a value, not a chip-size code.
        assert_eq!(infer_mounting("CAP 1000PF"), "CAP 1000PF");
    }

    #[test]
    fn ic_pin_family_reordered() {
        assert_eq!(reformat_ic_packages("IC 555 8-PIN DIP"), "IC 555 DIP-8");
        assert_eq!(reformat_ic_packages("MCU 64-PIN TQFP"), "MCU TQFP-64");
    }

    #[test]
    fn ic_n_family_reordered() {
        assert_eq!(reformat_ic_packages("IC 14-DIP"), "IC DIP-14");
        assert_eq!(reformat_ic_packages("IC 8-SOIC"), "IC SOIC-8");
    }

    #[test]
    fn ic_family_first_untouched() {
        assert_eq!(reformat_ic_packages("IC SOIC-8"), "IC SOIC-8");
        assert_eq!(reformat_ic_packages("REG TO-220"), "REG TO-220");
    }

    #[test]
    fn tighten_joins_numeral_and_unit() {
        assert_eq!(tighten_units("CAP 39PF 50 V"), "CAP 39PF 50V");
        assert_eq!(tighten_units("ATTEN 3 DB"), "ATTEN 3DB");
        assert_eq!(tighten_units("OSC 16 MHZ"), "OSC 16MHZ");
    }

    #[test]
    fn tighten_leaves_non_units() {
        assert_eq!(tighten_units("COG 0402 SMT"), "COG 0402 SMT");
        assert_eq!(tighten_units("Q=30 GENERAL"), "Q=30 GENERAL");
    }

    #[test]
    fn pipeline_applies_in_order() {
        let result = run_pipeline("CAP CHIP CER 39 PF 50 V 2% COG", "X123");
        assert_eq!(result, "CAP CER 39PF 50V 2% COG");
    }
}
