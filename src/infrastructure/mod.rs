pub mod config;
pub mod credential_store;
pub mod date_normalizer;
pub mod error;
pub mod session_feed_client;
pub mod session_mapper;
pub mod session_store;
pub mod storage;
pub mod subject_cache;
pub mod text_generation_client;
