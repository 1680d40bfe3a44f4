pub mod cert_command;
pub mod command_validator;
pub mod executor;
pub mod filename_validator;
pub mod path_validator;

use command_validator::CommandValidator;
use filename_validator::FilenameValidator;
use path_validator::PathSanitizer;

/// The immutable validation tables, compiled once at startup and shared by
/// every request through `AppState`.
#[derive(Debug, Default)]
pub struct SafetyPolicy {
    pub commands: CommandValidator,
    pub paths: PathSanitizer,
    pub filenames: FilenameValidator,
}

impl SafetyPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}
