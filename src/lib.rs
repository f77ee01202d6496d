pub mod audit;
pub mod cidr;
pub mod collapse;
pub mod common;
pub mod config;
pub mod errors;
pub mod export;
pub mod exposure;
pub mod ports;
pub mod reachability;
pub mod resource;
pub mod snapshot;
pub mod topology;
