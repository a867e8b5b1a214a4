pub mod models;
pub mod subjects;
