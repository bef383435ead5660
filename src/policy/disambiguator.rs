use crate::domain::{ActionBucket, BucketKey};

use super::ranker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Exactly one bucket had actions.
    Single(BucketKey),
    /// Several category buckets conflicted and the ranker chose one.
    Ranked(BucketKey),
    NoAction,
}

impl Decision {
    pub fn bucket(self) -> Option<BucketKey> {
        match self {
            Decision::Single(key) | Decision::Ranked(key) => Some(key),
            Decision::NoAction => None,
        }
    }
}

/// `match_count` is the number of real categories the resolver matched; ranking
/// only settles conflicts between real categories.
pub fn disambiguate(buckets: &[ActionBucket], match_count: usize) -> Decision {
    let mut non_empty = buckets.iter().filter(|bucket| !bucket.is_empty());
    match (non_empty.next(), non_empty.next()) {
        (None, _) => Decision::NoAction,
        (Some(only), None) => Decision::Single(only.key),
        (Some(_), Some(_)) if match_count > 0 => {
            ranker::rank(buckets).map_or(Decision::NoAction, Decision::Ranked)
        }
        (Some(_), Some(_)) => Decision::NoAction,
    }
}

pub fn take_bucket(buckets: Vec<ActionBucket>, key: BucketKey) -> Option<ActionBucket> {
    buckets.into_iter().find(|bucket| bucket.key == key)
}
