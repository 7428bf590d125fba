pub mod api;
pub mod config;
pub mod enrichment;
pub mod identity;
pub mod ingest;
pub mod models;
pub mod network;
pub mod privacy;
pub mod storage;
pub mod tasks;
