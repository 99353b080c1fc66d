pub mod exec;
pub mod scratch;
