pub mod classifier;
pub mod digest;
pub mod disambiguator;
pub mod engine;
pub mod executor;
pub mod normalizer;
pub mod ranker;
pub mod resolver;
pub mod sync;
pub mod temporal;

pub use classifier::{parse_label, RuleScope};
pub use engine::{EngineSettings, ResolutionEngine, SyncMode};
pub use normalizer::report_key_from_link;
