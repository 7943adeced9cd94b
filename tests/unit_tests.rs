// Unit tests for the circle matching core

use circle_match::core::{jaccard_distance, MatchingEngine, MatchingPipeline, PartnerGraph};
use circle_match::models::{Event, EventFormat, OptInAttributes, OptInRecord, Role};
use circle_match::{CircleError, JaccardDiversity};
use std::collections::BTreeSet;
use std::sync::Arc;

fn single(event: &Event, id: &str, hosting: bool, interests: &[&str]) -> OptInRecord {
    OptInRecord::new(
        event.id,
        id,
        OptInAttributes {
            hosting_available: hosting,
            interests: interests.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        },
    )
}

fn pair(event: &Event, a: &str, b: &str, hosting: bool) -> [OptInRecord; 2] {
    [
        single(event, a, hosting, &[]).with_partner(b),
        single(event, b, hosting, &[]).with_partner(a),
    ]
}

fn pipeline() -> MatchingPipeline {
    MatchingPipeline::new(Arc::new(JaccardDiversity::default()))
}

fn tags(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_jaccard_distance_bounds() {
    assert_eq!(jaccard_distance(&tags(&["jazz"]), &tags(&["jazz"])), 0.0);
    assert_eq!(jaccard_distance(&tags(&["jazz"]), &tags(&["wine"])), 1.0);
    assert!((jaccard_distance(&tags(&["jazz", "wine"]), &tags(&["jazz"])) - 0.5).abs() < 1e-9);
}

#[test]
fn test_cluster_count_is_singles_plus_pairs() {
    let event = Event::new(EventFormat::Rotating, 6, 6);
    let mut pool: Vec<OptInRecord> = (0..4).map(|i| single(&event, &format!("s{i}"), false, &[])).collect();
    pool.extend(pair(&event, "p1a", "p1b", false));
    pool.extend(pair(&event, "p2a", "p2b", false));

    let graph = PartnerGraph::build(&pool).unwrap();
    assert_eq!(graph.len(), 6);
    assert_eq!(graph.pair_count(), 2);
    assert_eq!(graph.participant_count(), 8);
}

#[test]
fn test_asymmetric_link_is_corrupt() {
    let event = Event::new(EventFormat::Rotating, 6, 6);
    let pool = vec![
        single(&event, "a", false, &[]).with_partner("b"),
        single(&event, "b", false, &[]),
    ];

    assert!(matches!(
        PartnerGraph::build(&pool),
        Err(CircleError::CorruptPartnerLink { .. })
    ));
}

#[test]
fn test_twelve_singles_make_two_balanced_circles() {
    let event = Event::new(EventFormat::Rotating, 6, 6);
    let pool = (0..12).map(|i| single(&event, &format!("u{i:02}"), false, &[])).collect();

    let outcome = pipeline().run(&event, pool).unwrap();
    assert_eq!(outcome.circles.len(), 2);

    for circle in &outcome.circles {
        assert_eq!(circle.members.len(), 6);
        assert!(!circle.is_overflow);
        assert_eq!(circle.role_count(Role::Starter), 2);
        assert_eq!(circle.role_count(Role::Main), 2);
        assert_eq!(circle.role_count(Role::Dessert), 2);
    }
}

#[test]
fn test_seven_singles_leave_overflow_of_one() {
    let event = Event::new(EventFormat::Rotating, 6, 6);
    let pool = (0..7).map(|i| single(&event, &format!("u{i}"), false, &[])).collect();

    let outcome = pipeline().run(&event, pool).unwrap();
    let mut sizes: Vec<usize> = outcome.circles.iter().map(|c| c.members.len()).collect();
    sizes.sort();
    assert_eq!(sizes, vec![1, 6]);

    let overflow: Vec<_> = outcome.circles.iter().filter(|c| c.is_overflow).collect();
    assert_eq!(overflow.len(), 1);
    assert_eq!(overflow[0].members.len(), 1);
}

#[test]
fn test_every_participant_placed_once_and_partners_together() {
    let event = Event::new(EventFormat::Hosted, 6, 6);
    let mut pool = Vec::new();
    for i in 0..5 {
        pool.extend(pair(&event, &format!("a{i}"), &format!("b{i}"), true));
    }
    for i in 0..4 {
        pool.push(single(&event, &format!("s{i}"), i % 2 == 0, &["jazz"]));
    }
    let expected: BTreeSet<String> = pool.iter().map(|r| r.user_id.clone()).collect();

    let outcome = pipeline().run(&event, pool).unwrap();

    let placed: Vec<String> = outcome
        .circles
        .iter()
        .flat_map(|c| c.members.iter().map(|m| m.user_id.clone()))
        .collect();
    assert_eq!(placed.len(), expected.len());
    assert_eq!(placed.into_iter().collect::<BTreeSet<_>>(), expected);

    for circle in &outcome.circles {
        for member in &circle.members {
            if let Some(partner) = &member.partner_user_id {
                assert!(circle.contains(partner), "{} separated from {}", member.user_id, partner);
            }
        }
        if !circle.needs_host {
            assert_eq!(circle.role_count(Role::Host), 1);
        }
    }
}

#[test]
fn test_rotating_partners_cook_together() {
    let event = Event::new(EventFormat::Rotating, 6, 6);
    let mut pool = Vec::new();
    for i in 0..3 {
        pool.extend(pair(&event, &format!("a{i}"), &format!("b{i}"), false));
    }

    let outcome = pipeline().run(&event, pool).unwrap();
    assert_eq!(outcome.circles.len(), 1);

    let circle = &outcome.circles[0];
    for member in &circle.members {
        let partner = member.partner_user_id.as_deref().unwrap();
        let partner_role = circle.members.iter().find(|m| m.user_id == partner).unwrap().role;
        assert_eq!(member.role, partner_role);
    }
    assert_eq!(circle.role_count(Role::Starter), 2);
    assert_eq!(circle.role_count(Role::Main), 2);
    assert_eq!(circle.role_count(Role::Dessert), 2);
}

#[test]
fn test_hosted_circle_without_candidates_is_flagged() {
    let event = Event::new(EventFormat::Hosted, 6, 6);
    let pool: Vec<OptInRecord> = (0..12)
        .map(|i| single(&event, &format!("u{i:02}"), i == 0, &[]))
        .collect();

    let outcome = pipeline().run(&event, pool).unwrap();
    assert_eq!(outcome.circles.len(), 2);
    assert_eq!(outcome.unhosted_circles.len(), 1);

    let unhosted = outcome.circles.iter().find(|c| c.needs_host).unwrap();
    assert_eq!(unhosted.id, outcome.unhosted_circles[0]);
    assert_eq!(unhosted.role_count(Role::Participant), 6);

    let hosted = outcome.circles.iter().find(|c| !c.needs_host).unwrap();
    assert!(hosted.contains("u00"));
    assert_eq!(hosted.role_count(Role::Host), 1);
}

#[test]
fn test_insufficient_pool() {
    let event = Event::new(EventFormat::Rotating, 6, 6);
    let pool = (0..5).map(|i| single(&event, &format!("u{i}"), false, &[])).collect();

    assert!(matches!(
        pipeline().run(&event, pool),
        Err(CircleError::InsufficientPool { pool_size: 5, minimum: 6 })
    ));
}

#[test]
fn test_engine_rejects_odd_circle_size() {
    assert!(matches!(
        MatchingEngine::with_default_metric(5, 5),
        Err(CircleError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_partition_is_deterministic() {
    let event = Event::new(EventFormat::Rotating, 6, 6);
    let interests = ["jazz", "wine", "hiking", "chess"];
    let pool: Vec<OptInRecord> = (0..18)
        .map(|i| single(&event, &format!("u{i:02}"), false, &[interests[i % 4]]))
        .collect();

    let membership = |outcome: circle_match::MatchOutcome| -> Vec<Vec<String>> {
        outcome
            .circles
            .into_iter()
            .map(|c| c.members.into_iter().map(|m| m.user_id).collect())
            .collect()
    };

    let first = membership(pipeline().run(&event, pool.clone()).unwrap());
    let mut reversed = pool;
    reversed.reverse();
    let second = membership(pipeline().run(&event, reversed).unwrap());
    assert_eq!(first, second);
}
