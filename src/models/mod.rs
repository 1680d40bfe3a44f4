pub mod auth;
pub mod certificate;
pub mod file;
pub mod monitoring;
