use crate::error::CircleError;
use crate::models::OptInRecord;
use std::collections::HashMap;

/// Index of a cluster in the [`PartnerGraph`] arena
pub type ClusterId = usize;

/// One participant, or a partner pair that must stay together
///
/// Members are indices into the pool snapshot the graph was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_pair(&self) -> bool {
        self.members.len() == 2
    }
}

/// Arena of clusters derived from a pool snapshot
#[derive(Debug, Clone)]
pub struct PartnerGraph {
    clusters: Vec<Cluster>,
    /// Pool index -> cluster holding it
    owner: Vec<ClusterId>,
}

impl PartnerGraph {
    /// Derive clusters from the pool
    ///
    /// Every record becomes part of exactly one cluster. Partner links must be
    /// symmetric and point at someone in the pool; anything else is
    /// [`CircleError::CorruptPartnerLink`].
    ///
    /// Clusters are ordered pairs first, then by the lowest member user id.
    pub fn build(pool: &[OptInRecord]) -> Result<Self, CircleError> {
        let index_of: HashMap<&str, usize> = pool
            .iter()
            .enumerate()
            .map(|(i, r)| (r.user_id.as_str(), i))
            .collect();

        if index_of.len() != pool.len() {
            return Err(CircleError::Internal(
                "pool snapshot contains duplicate user ids".to_string(),
            ));
        }

        let mut visited = vec![false; pool.len()];
        let mut clusters = Vec::new();

        for (i, record) in pool.iter().enumerate() {
            if visited[i] {
                continue;
            }
            visited[i] = true;

            let Some(partner_id) = record.partner_user_id.as_deref() else {
                clusters.push(Cluster { members: vec![i] });
                continue;
            };

            let corrupt = || CircleError::CorruptPartnerLink {
                user_id: record.user_id.clone(),
                partner_id: partner_id.to_string(),
            };

            let j = *index_of.get(partner_id).ok_or_else(corrupt)?;
            if j == i || visited[j] {
                return Err(corrupt());
            }
            if pool[j].partner_user_id.as_deref() != Some(record.user_id.as_str()) {
                return Err(corrupt());
            }

            visited[j] = true;
            let mut members = vec![i, j];
            members.sort_by(|a, b| pool[*a].user_id.cmp(&pool[*b].user_id));
            clusters.push(Cluster { members });
        }

        clusters.sort_by(|a, b| {
            b.size()
                .cmp(&a.size())
                .then_with(|| pool[a.members[0]].user_id.cmp(&pool[b.members[0]].user_id))
        });

        let mut owner = vec![0; pool.len()];
        for (id, cluster) in clusters.iter().enumerate() {
            for &member in &cluster.members {
                owner[member] = id;
            }
        }

        Ok(Self { clusters, owner })
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> &Cluster {
        &self.clusters[id]
    }

    pub fn cluster_of(&self, pool_index: usize) -> ClusterId {
        self.owner[pool_index]
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn pair_count(&self) -> usize {
        self.clusters.iter().filter(|c| c.is_pair()).count()
    }

    /// Number of participants across all clusters
    pub fn participant_count(&self) -> usize {
        self.owner.len()
    }
}
