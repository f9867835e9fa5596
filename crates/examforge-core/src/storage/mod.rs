pub mod schema;
pub mod store;

pub use store::{QualityAggregates, Store};
