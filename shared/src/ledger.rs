use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{PeerId, RequestId, RequestOrigin};

/// Record of the requests already applied to one entity, per origin peer
///
/// Every authoritative broadcast names the request that caused it, so all
/// peers keep identical ledgers and a new owner rejects the same duplicates
/// the old owner would have.
///
/// Only the newest `window` ids are kept for each origin. Anything at or
/// below the highest evicted id counts as applied: request ids only grow, so
/// an id that old can only be a late duplicate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLedger {
    origins: Vec<OriginRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct OriginRecord {
    peer: PeerId,
    applied: BTreeSet<RequestId>,
    floor: Option<RequestId>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, origin: &RequestOrigin) -> bool {
        let Some(record) = self.origins.iter().find(|record| record.peer == origin.peer) else {
            return false;
        };
        if let Some(floor) = record.floor {
            if origin.request_id <= floor {
                return true;
            }
        }
        record.applied.contains(&origin.request_id)
    }

    /// Returns `false` if the request was already recorded.
    pub fn record(&mut self, origin: RequestOrigin, window: usize) -> bool {
        if self.contains(&origin) {
            return false;
        }
        let index = match self
            .origins
            .iter()
            .position(|record| record.peer == origin.peer)
        {
            Some(index) => index,
            None => {
                self.origins.push(OriginRecord {
                    peer: origin.peer,
                    applied: BTreeSet::new(),
                    floor: None,
                });
                self.origins.len() - 1
            }
        };
        let record = &mut self.origins[index];
        record.applied.insert(origin.request_id);
        while record.applied.len() > window.max(1) {
            let Some(oldest) = record.applied.pop_first() else {
                break;
            };
            record.floor = Some(record.floor.map_or(oldest, |floor| floor.max(oldest)));
        }
        true
    }

    pub fn len(&self) -> usize {
        self.origins.iter().map(|record| record.applied.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
