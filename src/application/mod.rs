pub mod classifier;
pub mod differ;
pub mod matcher;
pub mod monitoring;
pub mod reconcile;
pub mod uuid_tracker;
