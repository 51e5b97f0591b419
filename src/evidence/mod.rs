//! Evidence records and ranked query output.

mod model;

pub use model::{EvidenceRecord, QueryResult, QueryScores, RankingMethod};
