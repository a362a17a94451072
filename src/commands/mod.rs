pub mod export;
pub mod ingest;
pub mod review;
pub mod status;
