pub mod aggregation;
pub mod ai_tips;
pub mod bootstrap;
pub mod commands;
pub mod session_sync;
pub mod subject_catalog;
pub mod tip_analyzer;
