pub mod config;
pub mod fusion;
pub mod geo;
pub mod inference;
pub mod pipeline;
pub mod routes;
pub mod storage;
