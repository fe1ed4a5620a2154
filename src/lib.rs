pub mod config;
pub mod db;
pub mod http;
pub mod model;
pub mod partner;
pub mod reconcile;
