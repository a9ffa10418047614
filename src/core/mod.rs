// src/core/mod.rs
//! Persistence, access scoping and configuration shared by the server and the admin CLI

pub mod access;
pub mod config_manager;
pub mod cv_repository;
pub mod database;
pub mod fs_ops;
pub mod user_repository;

pub use access::{AccessPolicy, OwnerScope};
pub use config_manager::ConfigManager;
pub use cv_repository::CvRepository;
pub use database::Database;
pub use fs_ops::FsOps;
pub use user_repository::UserRepository;
