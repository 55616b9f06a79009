#[macro_use]
extern crate log;
extern crate clap;

use clap::{App, Arg};
use env_logger::Env;
use serde::Deserialize;
use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use server::handler;
use server::server_state::ServerState;

#[derive(Deserialize, Debug)]
struct ServerConfig {
    host: String,
    port: String,
    db_path: String,
}

/// Entry point for the server.
///
/// Waits for user connections and creates a new thread for each connection.
fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("quarrydb server")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Sets a custom config file")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("host")
                .default_value("127.0.0.1")
                .help("Server IP address")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("port")
                .default_value("3333")
                .help("Server port number")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("db_path")
                .long("db_path")
                .value_name("db_path")
                .default_value("persist/db/")
                .help("Path where databases are stored")
                .takes_value(true),
        )
        .get_matches();

    let config: ServerConfig = if let Some(c) = matches.value_of("config") {
        let contents = fs::read_to_string(c).unwrap();
        serde_json::from_str(&contents).unwrap()
    } else {
        ServerConfig {
            host: matches.value_of("host").unwrap().to_string(),
            port: matches.value_of("port").unwrap().to_string(),
            db_path: matches.value_of("db_path").unwrap().to_string(),
        }
    };

    info!("Starting quarrydb... {:?}", config);

    let server_state = Arc::new(ServerState::new(PathBuf::from(&config.db_path)).unwrap());

    let mut bind_addr = config.host.clone();
    bind_addr.push(':');
    bind_addr.push_str(&config.port);
    let listener = TcpListener::bind(bind_addr).unwrap();

    info!(
        "Server listening with host {} on port {}",
        config.host, config.port
    );
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                debug!("New connection: {}", stream.peer_addr().unwrap());
                let server_state = Arc::clone(&server_state);
                let _handler = thread::spawn(move || {
                    handler::handle_client_request(stream, server_state);
                });
            }
            Err(e) => {
                error!("Error: {}", e);
            }
        }
    }
    drop(listener);
}
