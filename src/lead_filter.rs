//! Role filtering and seniority ranking.
//!
//! Role matching is case-insensitive substring containment throughout:
//! a target role of "product manager" matches "Senior Product Manager II".

use crate::models::{Contact, RankedContact};
use std::collections::HashSet;

/// Seniority ladder, highest priority first. Titles in one tier share a
/// score; within a tier the first matching title is reported.
pub const SENIORITY_LADDER: [&[&str]; 6] = [
    &["co-founder", "founder"],
    &["chief product officer"],
    &["head of product"],
    &["group product manager"],
    &["senior product manager"],
    &["product manager"],
];

/// Score weight of one step on the seniority ladder.
const SENIORITY_WEIGHT: u32 = 100;

pub fn normalize_role(role: &str) -> String {
    role.trim().to_lowercase()
}

/// True when `role` contains any non-blank entry of `roles`.
pub fn contains_role<S: AsRef<str>>(roles: &[S], role: &str) -> bool {
    let normalized = normalize_role(role);
    roles
        .iter()
        .map(|r| normalize_role(r.as_ref()))
        .any(|r| !r.is_empty() && normalized.contains(&r))
}

/// Returns the matched ladder title and its priority (0 when unranked).
pub fn role_priority(role: &str) -> (u32, Option<&'static str>) {
    let normalized = normalize_role(role);
    SENIORITY_LADDER
        .iter()
        .enumerate()
        .find_map(|(idx, tier)| {
            tier.iter()
                .find(|title| normalized.contains(*title))
                .map(|title| ((SENIORITY_LADDER.len() - idx) as u32, Some(*title)))
        })
        .unwrap_or((0, None))
}

/// Keeps contacts that pass, in order: the confidence floor, the
/// exclusion list (if any) and the target list (if any).
pub fn filter_contacts<S: AsRef<str>>(
    contacts: &[Contact],
    target_roles: &[S],
    excluded_roles: &[S],
    min_confidence: u8,
) -> Vec<Contact> {
    contacts
        .iter()
        .filter(|c| c.confidence >= min_confidence)
        .filter(|c| excluded_roles.is_empty() || !contains_role(excluded_roles, &c.role))
        .filter(|c| target_roles.is_empty() || contains_role(target_roles, &c.role))
        .cloned()
        .collect()
}

/// Scores every contact and sorts by score, highest first.
///
/// The sort is stable, so equal scores keep their input order.
pub fn rank_contacts(contacts: &[Contact]) -> Vec<RankedContact> {
    let mut ranked: Vec<RankedContact> = contacts
        .iter()
        .map(|contact| {
            let (seniority, title) = role_priority(&contact.role);
            RankedContact {
                score: seniority * SENIORITY_WEIGHT + u32::from(contact.confidence),
                rank_reason: title.map(|t| format!("matched seniority '{}'", t)),
                contact: contact.clone(),
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Drops repeated emails (case-insensitive), keeping the first occurrence.
pub fn dedupe_contacts(contacts: Vec<Contact>) -> Vec<Contact> {
    let mut seen = HashSet::new();
    contacts
        .into_iter()
        .filter(|c| seen.insert(c.identity_key()))
        .collect()
}
