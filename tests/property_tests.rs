/// Property-based tests using proptest
/// Tests invariants of filtering, ranking, confidence scaling and domain normalization
use pm_outreach::handlers::normalize_domain;
use pm_outreach::lead_filter::{contains_role, dedupe_contacts, filter_contacts, rank_contacts, role_priority};
use pm_outreach::models::{confidence_from_fraction, confidence_from_percent, Contact};
use proptest::prelude::*;

const ROLES: [&str; 8] = [
    "Founder",
    "Chief Product Officer",
    "Head of Product",
    "Group Product Manager",
    "Senior Product Manager",
    "Product Manager",
    "Sales Rep",
    "Software Engineer",
];

fn arb_contact() -> impl Strategy<Value = Contact> {
    (0usize..ROLES.len(), "[a-z]{1,8}", 0u8..=100u8).prop_map(|(role, local, confidence)| {
        Contact::new(
            "Test",
            "User",
            ROLES[role],
            format!("{}@acme.com", local),
            confidence,
            "Acme",
        )
        .unwrap()
    })
}

// Property: filtering only ever removes contacts, and everything kept passes every rule
proptest! {
    #[test]
    fn filter_output_satisfies_all_rules(
        contacts in prop::collection::vec(arb_contact(), 0..30),
        min_confidence in 0u8..=100u8,
    ) {
        let targets = ["product"];
        let excluded = ["senior"];
        let kept = filter_contacts(&contacts, &targets, &excluded, min_confidence);

        prop_assert!(kept.len() <= contacts.len());
        for c in &kept {
            prop_assert!(c.confidence >= min_confidence);
            prop_assert!(contains_role(&targets, &c.role));
            prop_assert!(!contains_role(&excluded, &c.role));
        }
    }

    #[test]
    fn filter_preserves_input_order(contacts in prop::collection::vec(arb_contact(), 0..30)) {
        let none: [&str; 0] = [];
        let kept = filter_contacts(&contacts, &none, &none, 50);
        let expected: Vec<_> = contacts.iter().filter(|c| c.confidence >= 50).cloned().collect();
        prop_assert_eq!(kept, expected);
    }
}

// Property: ranking is a stable permutation sorted by seniority then confidence
proptest! {
    #[test]
    fn rank_is_sorted_permutation(contacts in prop::collection::vec(arb_contact(), 0..30)) {
        let ranked = rank_contacts(&contacts);
        prop_assert_eq!(ranked.len(), contacts.len());

        for pair in ranked.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }

        for r in &ranked {
            let (seniority, _) = role_priority(&r.contact.role);
            prop_assert_eq!(r.score, seniority * 100 + u32::from(r.contact.confidence));
        }
    }

    #[test]
    fn higher_seniority_always_ranks_first(a in arb_contact(), b in arb_contact()) {
        let (sa, _) = role_priority(&a.role);
        let (sb, _) = role_priority(&b.role);
        prop_assume!(sa != sb);
        // A full-confidence contact ties with the next seniority step at zero confidence
        prop_assume!(a.confidence < 100 && b.confidence < 100);

        let ranked = rank_contacts(&[a, b]);
        let top = role_priority(&ranked[0].contact.role).0;
        prop_assert_eq!(top, sa.max(sb));
    }

    #[test]
    fn dedupe_leaves_unique_emails(contacts in prop::collection::vec(arb_contact(), 0..30)) {
        let unique = dedupe_contacts(contacts);
        let mut keys: Vec<_> = unique.iter().map(|c| c.identity_key()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), total);
    }
}

// Property: confidence conversions always land on the 0..=100 scale
proptest! {
    #[test]
    fn confidence_is_clamped(value in any::<i64>(), fraction in any::<f64>()) {
        prop_assert!(confidence_from_percent(value) <= 100);
        prop_assert!(confidence_from_fraction(fraction) <= 100);
    }

    #[test]
    fn fraction_scaling_matches_percent(fraction in 0.0f64..=1.0f64) {
        let expected = (fraction * 100.0).round() as u8;
        prop_assert_eq!(confidence_from_fraction(fraction), expected);
    }
}

// Property: domain normalization never panics and is idempotent
proptest! {
    #[test]
    fn normalize_domain_never_panics(input in "\\PC*") {
        let _ = normalize_domain(&input);
    }

    #[test]
    fn normalize_domain_is_idempotent(
        name in "[a-zA-Z0-9]{1,12}",
        tld in "[a-z]{2,4}",
        path in "(/[a-z]{0,6}){0,2}",
    ) {
        let input = format!("https://{}.{}{}", name, tld, path);
        let once = normalize_domain(&input).unwrap();
        prop_assert_eq!(normalize_domain(&once).unwrap(), once.clone());
        prop_assert_eq!(once, format!("{}.{}", name.to_lowercase(), tld));
    }
}
