pub mod adapters;
pub mod config;
pub mod error;
pub mod jobs;
pub mod token;
pub mod web;
