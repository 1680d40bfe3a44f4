pub mod certificate_service;
pub mod command_service;
pub mod email_service;
pub mod file_service;
pub mod monitoring_service;
