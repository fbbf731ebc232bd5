pub mod file;
pub mod memory;
pub mod upstash;
