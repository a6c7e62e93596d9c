pub mod admin_setting;
pub mod file;
pub mod user;
