pub mod audit_logger;
pub mod line_ending_handler;
pub mod path_utils;
