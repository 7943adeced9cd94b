use crate::core::allocator::AllocatedCircle;
use crate::core::partner_graph::{Cluster, PartnerGraph};
use crate::error::CircleError;
use crate::models::{Course, EventFormat, OptInRecord, Role};

/// Role of one circle member, by pool index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleAssignment {
    pub member: usize,
    pub role: Role,
}

/// Assign a role to every member of a finalized circle
///
/// Either every member gets a role or the call fails; there is no partial
/// assignment.
///
/// # Arguments
/// * `circle_index` - Position of the circle in the allocation, for error reporting
/// * `circle` - The allocated circle
/// * `graph` - Clusters the circle was built from
/// * `pool` - The pool snapshot
/// * `format` - The event format
pub fn assign_roles(
    circle_index: usize,
    circle: &AllocatedCircle,
    graph: &PartnerGraph,
    pool: &[OptInRecord],
    format: EventFormat,
) -> Result<Vec<RoleAssignment>, CircleError> {
    let mut clusters: Vec<&Cluster> = circle.clusters.iter().map(|&id| graph.cluster(id)).collect();
    clusters.sort_by(|a, b| {
        b.size()
            .cmp(&a.size())
            .then_with(|| pool[a.members[0]].user_id.cmp(&pool[b.members[0]].user_id))
    });

    match format {
        EventFormat::Rotating => Ok(assign_courses(&clusters, pool)),
        EventFormat::Hosted => assign_host(circle_index, &clusters, pool),
    }
}

/// Rotating format: each cluster cooks the least-covered course
///
/// Partners share a course. Among equally covered courses a cluster's stated
/// preference wins when it is one of them; otherwise starter, main, dessert
/// order decides. For singles only this is plain round robin.
fn assign_courses(clusters: &[&Cluster], pool: &[OptInRecord]) -> Vec<RoleAssignment> {
    let mut counts = [0usize; 3];
    let mut assignments = Vec::new();

    for cluster in clusters {
        let lowest = counts.iter().copied().min().unwrap_or(0);
        let open: Vec<usize> = (0..Course::ALL.len()).filter(|&i| counts[i] == lowest).collect();

        let preferred = cluster
            .members
            .iter()
            .filter_map(|&m| pool[m].attributes.course_preference)
            .map(course_index)
            .find(|i| open.contains(i));

        let slot = preferred.unwrap_or(open[0]);
        counts[slot] += cluster.size();

        let role = Course::ALL[slot].role();
        assignments.extend(cluster.members.iter().map(|&member| RoleAssignment { member, role }));
    }

    assignments
}

fn course_index(course: Course) -> usize {
    match course {
        Course::Starter => 0,
        Course::Main => 1,
        Course::Dessert => 2,
    }
}

/// Hosted format: the lowest user id among members able to host
fn assign_host(
    circle_index: usize,
    clusters: &[&Cluster],
    pool: &[OptInRecord],
) -> Result<Vec<RoleAssignment>, CircleError> {
    let members: Vec<usize> = clusters.iter().flat_map(|c| c.members.iter().copied()).collect();

    let host = members
        .iter()
        .copied()
        .filter(|&m| pool[m].hosting_available())
        .min_by(|&a, &b| pool[a].user_id.cmp(&pool[b].user_id))
        .ok_or(CircleError::NoHostAvailable { circle_index })?;

    Ok(members
        .into_iter()
        .map(|member| RoleAssignment {
            member,
            role: if member == host { Role::Host } else { Role::Participant },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocator::MatchingEngine;
    use crate::models::OptInAttributes;
    use uuid::Uuid;

    fn person(id: &str, hosting: bool, preference: Option<Course>) -> OptInRecord {
        OptInRecord::new(
            Uuid::nil(),
            id,
            OptInAttributes {
                hosting_available: hosting,
                course_preference: preference,
                ..Default::default()
            },
        )
    }

    fn single_circle(pool: &[OptInRecord]) -> (PartnerGraph, AllocatedCircle) {
        let graph = PartnerGraph::build(pool).unwrap();
        let engine = MatchingEngine::with_default_metric(pool.len() + pool.len() % 2, 1).unwrap();
        let allocation = engine.allocate(pool, &graph).unwrap();
        assert_eq!(allocation.circles.len(), 1);
        (graph, allocation.circles[0].clone())
    }

    fn count(assignments: &[RoleAssignment], role: Role) -> usize {
        assignments.iter().filter(|a| a.role == role).count()
    }

    fn role_of(assignments: &[RoleAssignment], pool: &[OptInRecord], user: &str) -> Role {
        assignments
            .iter()
            .find(|a| pool[a.member].user_id == user)
            .map(|a| a.role)
            .unwrap()
    }

    #[test]
    fn test_six_singles_balanced() {
        let pool: Vec<_> = (0..6).map(|i| person(&format!("u{i}"), true, None)).collect();
        let (graph, circle) = single_circle(&pool);

        let roles = assign_roles(0, &circle, &graph, &pool, EventFormat::Rotating).unwrap();

        assert_eq!(roles.len(), 6);
        assert_eq!(count(&roles, Role::Starter), 2);
        assert_eq!(count(&roles, Role::Main), 2);
        assert_eq!(count(&roles, Role::Dessert), 2);
    }

    #[test]
    fn test_partners_share_a_course() {
        let pool = vec![
            person("a", true, None).with_partner("b"),
            person("b", true, None).with_partner("a"),
            person("c", true, None),
            person("d", true, None),
            person("e", true, None),
            person("f", true, None),
        ];
        let (graph, circle) = single_circle(&pool);

        let roles = assign_roles(0, &circle, &graph, &pool, EventFormat::Rotating).unwrap();

        assert_eq!(role_of(&roles, &pool, "a"), role_of(&roles, &pool, "b"));
        assert_eq!(count(&roles, Role::Starter), 2);
        assert_eq!(count(&roles, Role::Main), 2);
        assert_eq!(count(&roles, Role::Dessert), 2);
    }

    #[test]
    fn test_preference_honored_when_it_keeps_balance() {
        let pool = vec![
            person("a", true, Some(Course::Dessert)),
            person("b", true, None),
            person("c", true, None),
            person("d", true, None),
            person("e", true, None),
            person("f", true, None),
        ];
        let (graph, circle) = single_circle(&pool);

        let roles = assign_roles(0, &circle, &graph, &pool, EventFormat::Rotating).unwrap();

        assert_eq!(role_of(&roles, &pool, "a"), Role::Dessert);
        assert_eq!(count(&roles, Role::Starter), 2);
        assert_eq!(count(&roles, Role::Dessert), 2);
    }

    #[test]
    fn test_preference_is_advisory() {
        // Everyone wants dessert; balance still wins
        let pool: Vec<_> = (0..6)
            .map(|i| person(&format!("u{i}"), true, Some(Course::Dessert)))
            .collect();
        let (graph, circle) = single_circle(&pool);

        let roles = assign_roles(0, &circle, &graph, &pool, EventFormat::Rotating).unwrap();

        assert_eq!(count(&roles, Role::Starter), 2);
        assert_eq!(count(&roles, Role::Main), 2);
        assert_eq!(count(&roles, Role::Dessert), 2);
    }

    #[test]
    fn test_hosted_picks_lowest_available_user() {
        let pool = vec![
            person("a", false, None),
            person("b", true, None),
            person("c", true, None),
            person("d", false, None),
        ];
        let (graph, circle) = single_circle(&pool);

        let roles = assign_roles(0, &circle, &graph, &pool, EventFormat::Hosted).unwrap();

        assert_eq!(roles.len(), 4);
        assert_eq!(count(&roles, Role::Host), 1);
        assert_eq!(role_of(&roles, &pool, "b"), Role::Host);
        assert_eq!(count(&roles, Role::Participant), 3);
    }

    #[test]
    fn test_hosted_pair_has_single_host() {
        let pool = vec![
            person("a", true, None).with_partner("b"),
            person("b", true, None).with_partner("a"),
            person("c", false, None),
            person("d", false, None),
        ];
        let (graph, circle) = single_circle(&pool);

        let roles = assign_roles(0, &circle, &graph, &pool, EventFormat::Hosted).unwrap();

        assert_eq!(count(&roles, Role::Host), 1);
        assert_eq!(role_of(&roles, &pool, "a"), Role::Host);
        assert_eq!(role_of(&roles, &pool, "b"), Role::Participant);
    }

    #[test]
    fn test_hosted_without_candidates_fails() {
        let pool: Vec<_> = (0..4).map(|i| person(&format!("u{i}"), false, None)).collect();
        let (graph, circle) = single_circle(&pool);

        let err = assign_roles(3, &circle, &graph, &pool, EventFormat::Hosted).unwrap_err();
        assert!(matches!(err, CircleError::NoHostAvailable { circle_index: 3 }));
    }
}
