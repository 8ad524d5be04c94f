use super::*;
use crate::labels::Expression;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn config(max_age: i32, preload: bool, include_sub_domains: bool) -> HstsConfig {
    HstsConfig {
        max_age,
        preload,
        include_sub_domains,
    }
}

fn bounded(smallest: Option<i32>, largest: Option<i32>) -> Requirement {
    Requirement {
        max_age: MaxAgeRange { smallest, largest },
        ..Default::default()
    }
}

#[rstest]
#[case(100, Ok(()))]
#[case(99, Err(Violation::BelowMinAge { max_age: 99, smallest: 100 }))]
#[case(200, Ok(()))]
#[case(201, Err(Violation::ExceedsMaxAge { max_age: 201, largest: 200 }))]
fn max_age_bounds_are_inclusive(#[case] max_age: i32, #[case] expected: Result<(), Violation>) {
    let requirement = bounded(Some(100), Some(200));
    assert_eq!(
        requirement.validate(&config(max_age, false, false)),
        expected
    );
}

#[test]
fn negative_bounds_are_ignored() {
    let requirement = bounded(Some(-1), Some(-1));
    assert_eq!(requirement.validate(&config(0, false, false)), Ok(()));
    assert_eq!(requirement.validate(&config(i32::MAX, false, false)), Ok(()));
}

#[rstest]
#[case(Policy::NoOpinion, false, Ok(()))]
#[case(Policy::NoOpinion, true, Ok(()))]
#[case(Policy::Require, true, Ok(()))]
#[case(Policy::Require, false, Err(Violation::PreloadRequired))]
#[case(Policy::RequireNot, false, Ok(()))]
#[case(Policy::RequireNot, true, Err(Violation::PreloadForbidden))]
fn preload_policy(
    #[case] policy: Policy,
    #[case] preload: bool,
    #[case] expected: Result<(), Violation>,
) {
    let requirement = Requirement {
        preload_policy: policy,
        ..Default::default()
    };
    assert_eq!(requirement.validate(&config(1, preload, false)), expected);
}

#[rstest]
#[case(Policy::NoOpinion, false, Ok(()))]
#[case(Policy::NoOpinion, true, Ok(()))]
#[case(Policy::Require, true, Ok(()))]
#[case(Policy::Require, false, Err(Violation::IncludeSubDomainsRequired))]
#[case(Policy::RequireNot, false, Ok(()))]
#[case(Policy::RequireNot, true, Err(Violation::IncludeSubDomainsForbidden))]
fn include_sub_domains_policy(
    #[case] policy: Policy,
    #[case] include_sub_domains: bool,
    #[case] expected: Result<(), Violation>,
) {
    let requirement = Requirement {
        include_sub_domains_policy: policy,
        ..Default::default()
    };
    assert_eq!(
        requirement.validate(&config(1, false, include_sub_domains)),
        expected
    );
}

#[test]
fn reports_first_violation() {
    let requirement = Requirement {
        max_age: MaxAgeRange {
            smallest: None,
            largest: Some(10),
        },
        preload_policy: Policy::Require,
        include_sub_domains_policy: Policy::Require,
        ..Default::default()
    };
    assert_eq!(
        requirement.validate(&config(11, false, false)),
        Err(Violation::ExceedsMaxAge {
            max_age: 11,
            largest: 10
        })
    );
    assert_eq!(
        requirement.validate(&config(10, false, false)),
        Err(Violation::PreloadRequired)
    );
    assert_eq!(
        requirement.validate(&config(10, true, false)),
        Err(Violation::IncludeSubDomainsRequired)
    );
}

fn for_domain(pattern: &str) -> Requirement {
    Requirement {
        domain_patterns: vec![pattern.to_string()],
        ..Default::default()
    }
}

#[test]
fn selects_first_match() {
    let requirements = [
        for_domain(r"other\.test"),
        bounded(Some(1), None),
        for_domain(r".*\.example\.com"),
        for_domain(r"app\.example\.com"),
    ];

    let (index, _) = select(&requirements, &Labels::default(), ["app.example.com"])
        .unwrap()
        .expect("a requirement must match");
    assert_eq!(index, 2);
}

#[test]
fn considers_every_host() {
    let requirements = [for_domain(r"status\.example\.com")];
    let selected = select(
        &requirements,
        &Labels::default(),
        ["app.example.com", "status.example.com"],
    )
    .unwrap();
    assert!(selected.is_some());
}

#[test]
fn requires_namespace_and_domain() {
    let mut requirement = for_domain(r".*\.example\.com");
    requirement.namespace_selector = Some(Selector::from_iter(Some(("team", "a"))));
    let requirements = [requirement];

    let team_a = Labels::from_iter(Some(("team", "a")));
    let team_b = Labels::from_iter(Some(("team", "b")));

    assert!(select(&requirements, &team_a, ["app.example.com"])
        .unwrap()
        .is_some());
    assert!(select(&requirements, &team_b, ["app.example.com"])
        .unwrap()
        .is_none());
    assert!(select(&requirements, &team_a, ["app.other.com"])
        .unwrap()
        .is_none());
}

#[test]
fn invalid_selector_is_an_error() {
    let mut broken = for_domain(r".*");
    broken.namespace_selector = Some(Selector::from_iter(Some(Expression::new(
        "team", "Like", ["a"],
    ))));
    let requirements = [for_domain(r"nope\.test"), broken];

    let err = select(&requirements, &Labels::default(), ["app.example.com"]).unwrap_err();
    assert!(matches!(err, MatchError::Selector { index: 1, .. }), "{err}");
}

#[test]
fn invalid_requirement_after_match_is_not_evaluated() {
    let mut broken = for_domain(r".*");
    broken.namespace_selector = Some(Selector::from_iter(Some(Expression::new(
        "team", "Like", ["a"],
    ))));
    let requirements = [for_domain(r".*"), broken];

    let selected = select(&requirements, &Labels::default(), ["app.example.com"]).unwrap();
    assert_eq!(selected.map(|(i, _)| i), Some(0));
}

#[test]
fn invalid_pattern_is_an_error() {
    let requirements = [for_domain("[")];
    let err = select(&requirements, &Labels::default(), ["app.example.com"]).unwrap_err();
    assert!(matches!(err, MatchError::Pattern { index: 0, .. }), "{err}");
}

#[test]
fn deserializes_api_representation() {
    let requirement: Requirement = serde_json::from_value(serde_json::json!({
        "namespaceSelector": { "matchLabels": { "team": "a" } },
        "domainPatterns": [".*\\.example\\.com"],
        "maxAge": { "smallestMaxAge": 3600, "largestMaxAge": 31536000 },
        "preloadPolicy": "RequirePreload",
        "includeSubDomainsPolicy": "RequireNoIncludeSubDomains",
    }))
    .unwrap();

    assert_eq!(
        requirement,
        Requirement {
            namespace_selector: Some(Selector::from_iter(Some(("team", "a")))),
            domain_patterns: vec![r".*\.example\.com".to_string()],
            max_age: MaxAgeRange {
                smallest: Some(3600),
                largest: Some(31536000),
            },
            preload_policy: Policy::Require,
            include_sub_domains_policy: Policy::RequireNot,
        }
    );
}

#[test]
fn omitted_policies_have_no_opinion() {
    let requirement: Requirement = serde_json::from_value(serde_json::json!({
        "domainPatterns": ["foo\\.test"],
        "maxAge": {},
        "preloadPolicy": "",
    }))
    .unwrap();
    assert_eq!(requirement.preload_policy, Policy::NoOpinion);
    assert_eq!(requirement.include_sub_domains_policy, Policy::NoOpinion);
    assert_eq!(requirement.max_age, MaxAgeRange::default());
}

#[test]
fn serializes_api_representation() {
    let requirement = Requirement {
        preload_policy: Policy::RequireNot,
        include_sub_domains_policy: Policy::Require,
        ..Default::default()
    };
    let value = serde_json::to_value(&requirement).unwrap();
    assert_eq!(value["preloadPolicy"], "RequireNoPreload");
    assert_eq!(value["includeSubDomainsPolicy"], "RequireIncludeSubDomains");
}
