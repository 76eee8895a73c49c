pub mod column;
pub mod comparison;
pub mod error;
pub mod fingerprint;
pub mod ports;
pub mod reconciliation;
pub mod source;
pub mod value;
pub mod value_objects;
