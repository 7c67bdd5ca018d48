pub mod matcher;
pub mod payload;
pub mod extractor;
pub mod canonical;
pub mod aggregate;
pub mod slowops;
pub mod report;
pub mod session;
pub mod reader;
pub mod cache;
pub mod loginfo;
pub mod advisor;
