pub mod expiry_monitor;
pub mod session_reaper;
