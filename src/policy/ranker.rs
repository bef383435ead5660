use crate::domain::{ActionBucket, ActionKind, BucketKey, ClassifiedAction};

/// Base points per action kind. Lower totals are less permissive and win.
pub fn base_weight(kind: ActionKind) -> f64 {
    match kind {
        ActionKind::SendEmail => 1.0,
        ActionKind::OpenUrlFor => 50.0,
        ActionKind::OpenUrl => 5_000.0,
        ActionKind::OpenDomainFor => 20_000.0,
        ActionKind::OpenDomain => 50_000.0,
    }
}

pub fn action_score(action: &ClassifiedAction) -> f64 {
    let kind = action.kind.action_kind();
    let mut score = base_weight(kind);
    if matches!(kind, ActionKind::OpenUrlFor | ActionKind::OpenDomainFor) {
        score += action.duration_minutes.unwrap_or(0) as f64 / 60.0 * 10.0;
    }
    score
}

pub fn bucket_score(bucket: &ActionBucket) -> f64 {
    bucket.actions.iter().map(action_score).sum()
}

/// Picks the bucket with the lowest nonzero score; the first bucket reaching
/// the minimum wins ties. `None` when every bucket scores zero.
pub fn rank(buckets: &[ActionBucket]) -> Option<BucketKey> {
    let mut winner: Option<(BucketKey, f64)> = None;
    for bucket in buckets {
        let score = bucket_score(bucket);
        tracing::debug!(target: "ranker", bucket = %bucket.key, score, "bucket scored");
        if score == 0.0 {
            continue;
        }
        if winner.map_or(true, |(_, best)| score < best) {
            winner = Some((bucket.key, score));
        }
    }
    winner.map(|(key, _)| key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Recipients, RuleDuration, RuleKind, TimeUnit};

    fn action(kind: RuleKind) -> ClassifiedAction {
        let duration_minutes = kind.duration().map(|d| d.amount * d.unit.minutes());
        ClassifiedAction {
            kind,
            duration_minutes,
            label: String::new(),
            recipients: Recipients::default(),
        }
    }

    fn bucket(tag: i64, kinds: Vec<RuleKind>) -> ActionBucket {
        ActionBucket {
            key: BucketKey::Category(tag),
            actions: kinds.into_iter().map(action).collect(),
        }
    }

    fn hours(amount: i64) -> RuleDuration {
        RuleDuration {
            amount,
            unit: TimeUnit::Hours,
        }
    }

    #[test]
    fn duration_adds_ten_points_per_hour() {
        let scored = bucket(1, vec![RuleKind::OpenUrlFor(hours(2))]);
        assert_eq!(bucket_score(&scored), 70.0);
        let domain = bucket(2, vec![RuleKind::OpenDomainFor(hours(1))]);
        assert_eq!(bucket_score(&domain), 20_010.0);
    }

    #[test]
    fn lowest_nonzero_bucket_wins() {
        // A = 0, B = 5000, C = 2 * 50
        let buckets = vec![
            bucket(1, vec![]),
            bucket(2, vec![RuleKind::OpenUrl]),
            bucket(
                3,
                vec![
                    RuleKind::OpenUrlFor(RuleDuration {
                        amount: 0,
                        unit: TimeUnit::Minutes,
                    }),
                    RuleKind::OpenUrlFor(RuleDuration {
                        amount: 0,
                        unit: TimeUnit::Minutes,
                    }),
                ],
            ),
        ];
        assert_eq!(bucket_score(&buckets[2]), 100.0);
        assert_eq!(rank(&buckets), Some(BucketKey::Category(3)));
    }

    #[test]
    fn ties_go_to_first_bucket() {
        let buckets = vec![
            bucket(9, vec![RuleKind::OpenUrl]),
            bucket(4, vec![RuleKind::OpenUrl]),
        ];
        assert_eq!(rank(&buckets), Some(BucketKey::Category(9)));
    }

    #[test]
    fn all_zero_yields_nothing() {
        assert_eq!(rank(&[bucket(1, vec![]), bucket(2, vec![])]), None);
        assert_eq!(rank(&[]), None);
    }

    #[test]
    fn email_only_bucket_beats_any_open() {
        let buckets = vec![
            bucket(1, vec![RuleKind::OpenUrlFor(hours(1))]),
            bucket(
                2,
                vec![RuleKind::SendEmail {
                    template: "notice".into(),
                }],
            ),
        ];
        assert_eq!(rank(&buckets), Some(BucketKey::Category(2)));
    }
}
