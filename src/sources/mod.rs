pub mod demand_csv;
pub mod object_store;

pub use demand_csv::parse_demand_csv;
pub use object_store::{FetchError, ObjectStore, S3Config, S3ObjectStore};
