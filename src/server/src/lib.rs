#[macro_use]
extern crate log;

pub mod commands;
pub mod conductor;
pub mod csv_utils;
pub mod database_state;
pub mod handler;
pub mod record_printer;
pub mod server_state;
pub mod sql_parser;
