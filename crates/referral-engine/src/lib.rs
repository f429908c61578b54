pub mod artifact;
pub mod config;
pub mod corpus;
pub mod error;
pub mod model;
pub mod recommender;
pub mod service;
pub mod train;
