use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use crate::commands;
use crate::conductor::Conductor;
use crate::server_state::ServerState;
use crate::sql_parser::SQLParser;
use optimizer::Optimizer;
use queryexe::query::Executor;

pub enum Request {
    Err,
    Command(commands::Commands),
    SQL(String),
}

/// Separates user input requests into commands and SQL inputs.
fn parse_input_request(cmd: String) -> Request {
    if cmd.starts_with('\\') {
        match commands::parse_command(cmd) {
            Some(c) => Request::Command(c),
            None => Request::Err,
        }
    } else {
        Request::SQL(cmd)
    }
}

/// Waits for user commands and dispatches them; one session per client
/// connection.
pub fn handle_client_request(mut stream: TcpStream, server_state: Arc<ServerState>) {
    let mut data = String::new();
    let mut buf_stream = BufReader::new(stream.try_clone().expect("Failed to clone stream"));

    let parser = SQLParser::new();
    let executor = Executor::new_ref();
    let optimizer = Optimizer::new();
    let mut conductor = Conductor::new(parser, optimizer, executor).unwrap();

    // Session id from the peer address.
    let peer_ip_string = stream.peer_addr().unwrap().ip().to_string();
    let mut s = DefaultHasher::new();
    peer_ip_string.hash(&mut s);
    let client_id = s.finish();

    let mut quiet = false;
    while match buf_stream.read_line(&mut data) {
        Ok(size) => {
            debug!("{}", data);
            if size == 0 || data == "\\close\n" {
                server_state.close_client_connection(client_id);
                false
            } else if data == "\\shutdown\n" {
                let quit = String::from("\\quit");
                stream.write_all(quit.as_bytes()).unwrap();
                data.clear();
                stream.shutdown(Shutdown::Both).unwrap();
                server_state.shutdown().unwrap();
                std::process::exit(0);
            } else if data == "\\quiet\n" {
                quiet = true;
                stream.write_all("QUIET MODE".as_bytes()).unwrap();
                data.clear();
                true
            } else {
                let line = match String::from_utf8(data.as_bytes()[0..size].to_vec()) {
                    Ok(s) => s,
                    _ => return,
                };

                let response: String = match parse_input_request(line) {
                    Request::Command(command) => {
                        match conductor.run_command(command, client_id, &server_state) {
                            Ok(qr) => {
                                info!("Success running command");
                                qr
                            }
                            Err(err) => {
                                info!("Error while executing command; error: {:?}", err);
                                err.to_string()
                            }
                        }
                    }
                    Request::SQL(sql) => {
                        match server_state.get_connected_db(client_id) {
                            Ok(db_state) => match conductor.run_statement(&sql, &db_state) {
                                Ok(qr) => {
                                    info!("Success running SQL statement");
                                    qr.result().to_string()
                                }
                                Err(err) => {
                                    info!("Error while executing SQL statement");
                                    err.to_string()
                                }
                            },
                            Err(err) => err.to_string(),
                        }
                    }
                    Request::Err => "Unknown command".to_string(),
                };
                if quiet {
                    stream.write_all("ok".as_bytes()).unwrap();
                } else {
                    stream.write_all(response.as_bytes()).unwrap();
                }
                data.clear();
                true
            }
        }
        Err(_) => {
            error!(
                "An error occurred, terminating connection with {}",
                stream.peer_addr().unwrap()
            );
            stream.shutdown(Shutdown::Both).unwrap();
            false
        }
    } {}
}
