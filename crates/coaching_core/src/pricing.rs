//! Credit prices for every paid operation, kept in one place.
//!
//! Bump [`PRICING_VERSION`] whenever a price changes so audit records can be
//! reconciled against the table that was in force.

pub const PRICING_VERSION: &str = "2024-01";

/// Charged per document in a generated package.
pub const PACKAGE_CREDITS_PER_DOCUMENT: u32 = 5;

/// Charged when a new company is onboarded and analysed.
pub const NEW_COMPANY_ANALYSIS_CREDITS: u32 = 10;

/// Charged for the AI analysis of a completed exercise.
pub const EXERCISE_ANALYSIS_CREDITS: u32 = 10;

/// Health-score credits charged per business health score run.
pub const HEALTH_SCORE_CREDITS: u32 = 1;

/// Cost of a package containing `document_count` documents.
pub fn package_cost(document_count: usize) -> u32 {
    u32::try_from(document_count)
        .unwrap_or(u32::MAX)
        .saturating_mul(PACKAGE_CREDITS_PER_DOCUMENT)
}
