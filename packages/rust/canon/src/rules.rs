//! Rule tables for the canonicalization passes.
//!
//! Each normalization category keeps its spellings in one ordered table so
//! new vocabulary lands here instead of inside the pass logic. Order is
//! load-bearing for the resistance rules (mega before kilo before plain,
//! otherwise `KOHM` would be re-matched as `OHM`).

use std::sync::LazyLock;

use regex::Regex;

/// Filler tokens dropped outright from descriptions.
pub(crate) const NOISE_WORDS: &[&str] = &["CHIP"];

// ---------------------------------------------------------------------------
// Resistance
// ---------------------------------------------------------------------------

/// Resistance spellings, applied in order: `MOHM` → `M`, `KOHM` → `K`,
/// `OHM` → `R`, each attached to the preceding numeral.
pub(crate) static RESISTANCE_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:MOHMS?|MΩ)").expect("valid regex"),
            "M",
        ),
        (
            Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:KOHMS?|KΩ)").expect("valid regex"),
            "K",
        ),
        (
            Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:OHMS?|Ω)").expect("valid regex"),
            "R",
        ),
    ]
});

// ---------------------------------------------------------------------------
// Capacitance
// ---------------------------------------------------------------------------

/// Microfarad spellings. The domain writes microfarads as `MF`, not the SI
/// `µF`; the value is carried over 1:1.
pub(crate) static UF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:UF|µF|μF)").expect("valid regex")
});

/// Nanofarads are never emitted; the value is rescaled to `MF` or `PF`.
pub(crate) static NF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*NF").expect("valid regex"));

/// Picofarad spellings, normalized to attached uppercase `PF`.
pub(crate) static PF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*PF").expect("valid regex"));

// ---------------------------------------------------------------------------
// Signs and ranges
// ---------------------------------------------------------------------------

/// `±A-±B` tolerance ranges collapse to `A-B`.
pub(crate) static PM_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:±|\+/-)\s*(\d+(?:\.\d+)?)\s*-\s*(?:±|\+/-)\s*(\d+(?:\.\d+)?)")
        .expect("valid regex")
});

/// A remaining `±X` becomes the bare value.
pub(crate) static PM_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:±|\+/-)\s*(\d)").expect("valid regex"));

/// Stray `+`/`-` attached to a numeral after whitespace. Range-internal
/// dashes are preceded by a digit, so they never match here.
pub(crate) static STRAY_SIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)[+\-](\d)").expect("valid regex"));

// ---------------------------------------------------------------------------
// Mounting type
// ---------------------------------------------------------------------------

/// `SMD` is the legacy spelling of `SMT`.
pub(crate) static SMD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSMD\b").expect("valid regex"));

/// A mounting type already present in the text suppresses inference.
pub(crate) static MOUNT_PRESENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:SMT|THT|PTH|TH)\b|THROUGH[\s-]?HOLE)").expect("valid regex")
});

/// Through-hole package keywords.
pub(crate) static TH_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:DIP|PDIP|CDIP|CERDIP|TO-\d+)\b").expect("valid regex")
});

/// Surface-mount package families, with an optional pin-count suffix
/// (`SOT-23`, `SOIC-8`).
pub(crate) static SMT_PACKAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:SOIC|SOT|SOD|QFN|DFN|TQFP|LQFP|QFP|TSSOP|SSOP|MSOP|SOP|PLCC|BGA|LGA|MELF|SMA|SMB|SMC)(?:-\d+)?\b",
    )
    .expect("valid regex")
});

/// Chip-size codes. The list is closed on purpose: arbitrary four-digit
/// numbers (`1000` from `1000PF`) must never look like a package.
pub(crate) static CHIP_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:0201|0402|0603|0805|1206|1210|1812|2010|2512)\b").expect("valid regex")
});

// ---------------------------------------------------------------------------
// IC packages
// ---------------------------------------------------------------------------

/// IC package families eligible for `<N>-<FAMILY>` → `<FAMILY>-<N>`.
const IC_FAMILY_ALT: &str =
    "PDIP|CDIP|CERDIP|DIP|SOIC|TSSOP|SSOP|MSOP|SOP|QFN|DFN|TQFP|LQFP|QFP|PLCC|BGA|SOT";

/// `8-PIN SOIC` → `SOIC-8`.
pub(crate) static PIN_FAMILY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(\d+)-PINS?\s+({IC_FAMILY_ALT})\b")).expect("valid regex")
});

/// `14-DIP` → `DIP-14`.
pub(crate) static N_FAMILY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(\d+)-({IC_FAMILY_ALT})\b")).expect("valid regex")
});

// ---------------------------------------------------------------------------
// Final tightening
// ---------------------------------------------------------------------------

/// Unit tokens that attach directly to the preceding numeral.
pub(crate) static TIGHTEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d+(?:\.\d+)?)\s+(KV|MV|V|MW|KW|W|MA|UA|A|KHZ|MHZ|GHZ|HZ|DBM|DB|PF|NF|MF|PH|NH|UH|MH|H)\b",
    )
    .expect("valid regex")
});
