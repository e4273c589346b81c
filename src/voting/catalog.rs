use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::election::{ElectionId, Position, PositionId},
    db::election::Election,
    store::Store,
};

/// Read-only snapshot of an election's positions and approved candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotCatalog {
    pub election_id: ElectionId,
    pub allow_abstain: bool,
    /// Positions ordered by `order`, then ID.
    pub positions: Vec<Position>,
}

impl BallotCatalog {
    /// Fetch the catalog of an election that is currently open for voting.
    pub async fn fetch(
        store: &dyn Store,
        election_id: ElectionId,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let election = store
            .election(election_id)
            .await?
            .ok_or(Error::ElectionNotFound(election_id))?;
        if !election.is_open_for_voting(now) {
            return Err(Error::ElectionNotOpenForVoting(election_id));
        }
        Ok(Self::from_election(&election))
    }

    /// Snapshot the given election, regardless of its state.
    pub fn from_election(election: &Election) -> Self {
        let mut positions = election.positions.clone();
        positions.sort_by_key(|p| (p.order, p.id));
        Self {
            election_id: election.id,
            allow_abstain: election.allow_abstain,
            positions,
        }
    }

    /// Get the position with the given ID.
    pub fn position(&self, position_id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == position_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::store::MemoryStore;

    #[test]
    fn positions_are_ordered() {
        let catalog = BallotCatalog::from_election(&Election::active_example());
        let ids: Vec<_> = catalog.positions.iter().map(|p| p.id).collect();
        // The example lists the committee (order 2) before the chair (order 1).
        assert_eq!(ids, vec![1, 2]);
        assert!(catalog.allow_abstain);
        assert_eq!(catalog.position(2).unwrap().max_selections, 2);
        assert!(catalog.position(99).is_none());
    }

    #[backend_test]
    async fn fetch_checks_voting_window(store: MemoryStore) {
        let now = Utc::now();

        let catalog = BallotCatalog::fetch(&store, 1, now).await.unwrap();
        assert_eq!(catalog.election_id, 1);

        assert!(matches!(
            BallotCatalog::fetch(&store, 2, now).await,
            Err(Error::ElectionNotOpenForVoting(2))
        ));
        assert!(matches!(
            BallotCatalog::fetch(&store, 3, now).await,
            Err(Error::ElectionNotOpenForVoting(3))
        ));
        assert!(matches!(
            BallotCatalog::fetch(&store, 42, now).await,
            Err(Error::ElectionNotFound(42))
        ));
    }
}
