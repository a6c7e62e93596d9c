pub mod auth;
pub mod blob_store;
pub mod compression;
pub mod file_storage;
pub mod file_validation;
pub mod plans;
pub mod settings;
pub mod user_admin;
