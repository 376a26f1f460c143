use super::types::PlatformVariantSummary;
use crate::model::ProductVariant;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Which rule produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Barcode,
    Sku,
    FuzzyTitle,
}

/// A proposed link between a platform variant and a canonical variant.
///
/// Persisted as JSON under the connection's `mappingSuggestions` key; the
/// user reviews these before the connection flips to `syncing`. A
/// suggestion without a match (`suggested_variant_id: None`) is the cue for
/// the review UI to offer "create new canonical" or "skip".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSuggestion {
    pub platform_variant_id: String,
    pub platform_product_id: Option<String>,
    pub platform_sku: Option<String>,
    pub platform_title: String,
    pub suggested_variant_id: Option<Uuid>,
    pub confidence: f64,
    pub matched_on: Option<MatchRule>,
}

/// Match suggester over a user's canonical variants.
///
/// Matching rules, in priority order:
/// 1. exact barcode (case-sensitive, non-empty) — confidence 1.0
/// 2. exact SKU (case-insensitive, trimmed, non-empty) — confidence 0.95
/// 3. fuzzy title above the similarity threshold, only when neither SKU nor
///    barcode matched — confidence = similarity
///
/// Ties break on confidence, then on the candidate with the most recent
/// `updated_at`. Each platform variant yields at most one suggestion.
pub struct SuggestionEngine {
    title_threshold: f64,
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self {
            title_threshold: 0.85,
        }
    }
}

impl SuggestionEngine {
    pub fn with_threshold(title_threshold: f64) -> Self {
        Self { title_threshold }
    }

    pub fn suggest(
        &self,
        platform_variants: &[PlatformVariantSummary],
        canonical_variants: &[ProductVariant],
    ) -> Vec<MappingSuggestion> {
        platform_variants
            .iter()
            .map(|pv| self.suggest_one(pv, canonical_variants))
            .collect()
    }

    fn suggest_one(
        &self,
        platform_variant: &PlatformVariantSummary,
        canonical_variants: &[ProductVariant],
    ) -> MappingSuggestion {
        let mut best: Option<(&ProductVariant, f64, MatchRule)> = None;

        for candidate in canonical_variants {
            let scored = self.score(platform_variant, candidate);
            let Some((confidence, rule)) = scored else {
                continue;
            };

            best = match best {
                None => Some((candidate, confidence, rule)),
                Some((current, current_confidence, current_rule)) => {
                    if confidence > current_confidence
                        || (confidence == current_confidence
                            && candidate.updated_at > current.updated_at)
                    {
                        Some((candidate, confidence, rule))
                    } else {
                        Some((current, current_confidence, current_rule))
                    }
                }
            };
        }

        match best {
            Some((candidate, confidence, rule)) => MappingSuggestion {
                platform_variant_id: platform_variant.platform_variant_id.clone(),
                platform_product_id: platform_variant.platform_product_id.clone(),
                platform_sku: platform_variant.sku.clone(),
                platform_title: platform_variant.title.clone(),
                suggested_variant_id: Some(candidate.id),
                confidence,
                matched_on: Some(rule),
            },
            None => MappingSuggestion {
                platform_variant_id: platform_variant.platform_variant_id.clone(),
                platform_product_id: platform_variant.platform_product_id.clone(),
                platform_sku: platform_variant.sku.clone(),
                platform_title: platform_variant.title.clone(),
                suggested_variant_id: None,
                confidence: 0.0,
                matched_on: None,
            },
        }
    }

    fn score(
        &self,
        platform_variant: &PlatformVariantSummary,
        candidate: &ProductVariant,
    ) -> Option<(f64, MatchRule)> {
        if let (Some(platform_barcode), Some(candidate_barcode)) =
            (&platform_variant.barcode, &candidate.barcode)
        {
            if !platform_barcode.is_empty() && platform_barcode == candidate_barcode {
                return Some((1.0, MatchRule::Barcode));
            }
        }

        let platform_sku = platform_variant
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|sku| !sku.is_empty());
        if let (Some(platform_sku), Some(candidate_sku)) = (platform_sku, candidate.effective_sku())
        {
            if platform_sku.eq_ignore_ascii_case(candidate_sku) {
                return Some((0.95, MatchRule::Sku));
            }
        }

        // Fuzzy title only applies when identifiers gave nothing.
        let similarity = title_similarity(&platform_variant.title, &candidate.title);
        if similarity >= self.title_threshold {
            return Some((similarity, MatchRule::FuzzyTitle));
        }

        None
    }
}

/// Similarity between two titles, in [0, 1].
///
/// Takes the better of token-set Jaccard (robust to word reordering) and
/// Jaro-Winkler (robust to small edits) over normalized strings.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a_norm = normalize(a);
    let b_norm = normalize(b);

    if a_norm.is_empty() || b_norm.is_empty() {
        return 0.0;
    }
    if a_norm == b_norm {
        return 1.0;
    }

    let a_tokens: HashSet<&str> = a_norm.split_whitespace().collect();
    let b_tokens: HashSet<&str> = b_norm.split_whitespace().collect();
    let intersection = a_tokens.intersection(&b_tokens).count();
    let union = a_tokens.union(&b_tokens).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    };

    let jaro = strsim::jaro_winkler(&a_norm, &b_norm);

    jaccard.max(jaro)
}

fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn canonical(sku: Option<&str>, barcode: Option<&str>, title: &str) -> ProductVariant {
        let mut variant = ProductVariant::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            title,
            Decimal::new(1000, 2),
        );
        variant.sku = sku.map(str::to_string);
        variant.barcode = barcode.map(str::to_string);
        variant
    }

    fn platform(sku: Option<&str>, barcode: Option<&str>, title: &str) -> PlatformVariantSummary {
        PlatformVariantSummary {
            platform_variant_id: "pv-1".to_string(),
            platform_product_id: Some("pp-1".to_string()),
            sku: sku.map(str::to_string),
            barcode: barcode.map(str::to_string),
            title: title.to_string(),
            price: None,
            image_url: None,
        }
    }

    #[test]
    fn barcode_beats_sku_without_duplicates() {
        // One canonical variant carries both the matching SKU and the
        // matching barcode; the result must be a single barcode suggestion.
        let engine = SuggestionEngine::default();
        let canonical_variants = vec![canonical(Some("SKU-1"), Some("BAR-1"), "Widget")];
        let platform_variants = vec![platform(Some("SKU-1"), Some("BAR-1"), "Widget")];

        let suggestions = engine.suggest(&platform_variants, &canonical_variants);

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].confidence, 1.0);
        assert_eq!(suggestions[0].matched_on, Some(MatchRule::Barcode));
        assert_eq!(
            suggestions[0].suggested_variant_id,
            Some(canonical_variants[0].id)
        );
    }

    #[test]
    fn sku_match_is_case_insensitive_and_trimmed() {
        let engine = SuggestionEngine::default();
        let canonical_variants = vec![canonical(Some("sku-9"), None, "Anything")];
        let platform_variants = vec![platform(Some("  SKU-9 "), None, "Unrelated title")];

        let suggestions = engine.suggest(&platform_variants, &canonical_variants);
        assert_eq!(suggestions[0].confidence, 0.95);
        assert_eq!(suggestions[0].matched_on, Some(MatchRule::Sku));
    }

    #[test]
    fn barcode_match_is_case_sensitive() {
        let engine = SuggestionEngine::default();
        let canonical_variants = vec![canonical(None, Some("bar-1"), "Left-handed hammer")];
        let platform_variants = vec![platform(None, Some("BAR-1"), "Completely different")];

        let suggestions = engine.suggest(&platform_variants, &canonical_variants);
        assert!(suggestions[0].suggested_variant_id.is_none());
    }

    #[test]
    fn fuzzy_title_matches_above_threshold() {
        let engine = SuggestionEngine::default();
        let canonical_variants = vec![canonical(None, None, "Organic Cotton T-Shirt Blue")];
        let platform_variants = vec![platform(None, None, "Organic Cotton T-Shirt  blue")];

        let suggestions = engine.suggest(&platform_variants, &canonical_variants);
        assert_eq!(suggestions[0].matched_on, Some(MatchRule::FuzzyTitle));
        assert!(suggestions[0].confidence >= 0.85);
    }

    #[test]
    fn unrelated_titles_produce_no_match() {
        let engine = SuggestionEngine::default();
        let canonical_variants = vec![canonical(None, None, "Garden hose 25ft")];
        let platform_variants = vec![platform(None, None, "Espresso machine")];

        let suggestions = engine.suggest(&platform_variants, &canonical_variants);
        assert!(suggestions[0].suggested_variant_id.is_none());
        assert_eq!(suggestions[0].confidence, 0.0);
        assert!(suggestions[0].matched_on.is_none());
    }

    #[test]
    fn ties_break_on_most_recent_update() {
        let engine = SuggestionEngine::default();
        let mut older = canonical(Some("SKU-1"), None, "Widget");
        older.updated_at = Utc::now() - Duration::days(30);
        let mut newer = canonical(Some("SKU-1"), None, "Widget");
        newer.updated_at = Utc::now();

        let newer_id = newer.id;
        let canonical_variants = vec![older, newer];
        let platform_variants = vec![platform(Some("SKU-1"), None, "Widget")];

        let suggestions = engine.suggest(&platform_variants, &canonical_variants);
        assert_eq!(suggestions[0].suggested_variant_id, Some(newer_id));
    }
}
