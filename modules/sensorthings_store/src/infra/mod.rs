//! Infrastructure layer - relational storage

pub mod storage;
