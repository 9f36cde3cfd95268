// Library for tests to access modules

pub mod command;
pub mod config;
pub mod discovery;
pub mod docker_repo;
pub mod error;
pub mod link_repo;
pub mod models;
pub mod routes;
pub mod tc;
pub mod worker;
