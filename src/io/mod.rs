pub mod registry;
pub mod run_log;
pub mod track_file;
