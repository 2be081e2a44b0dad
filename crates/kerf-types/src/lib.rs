pub mod digest;
pub mod error;
pub mod instance_id;
