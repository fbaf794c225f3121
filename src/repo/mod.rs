pub mod access;
pub mod writer;
