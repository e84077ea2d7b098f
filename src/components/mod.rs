pub mod command_log;
pub mod history;
