pub mod mymemory;
pub mod null;
