pub mod request;
pub mod rule;
pub mod types;

pub use request::{AccessRequest, ProcessingJob, ProcessingRequest, TrafficReportJob};
pub use rule::{
    ActionBucket, ActionKind, ActionRule, BucketKey, ClassifiedAction, Recipients, RuleDuration,
    RuleKind, TimeUnit,
};
pub use types::{
    Category, DigestText, EmailTemplate, FilterProfile, PolicyEntry, QueueSnapshot, SubscriberId,
    SubscriberInfo, POLICY_RULE_OPEN,
};
