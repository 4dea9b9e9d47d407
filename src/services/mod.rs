pub mod cancellation;
pub mod filters;
pub mod generator;
pub mod pipeline;
pub mod query;
pub mod ranker;
pub mod scoring;
pub mod signals;

pub use cancellation::CancellationToken;
pub use generator::{BatchReport, RecommendationGenerator, Stores};
pub use query::RecommendationQueryService;
