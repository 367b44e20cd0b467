//! Core enrichment pipeline for bomenrich.
//!
//! Ties sheet decoding, column inference, the per-row enrichment state
//! machine, and the checkpoint store together into end-to-end job
//! workflows (`run_job`, `resume_job`).

pub mod orchestrator;
pub mod pipeline;
pub mod response;
