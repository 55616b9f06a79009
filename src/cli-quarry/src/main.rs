extern crate clap;
extern crate rustyline;

use clap::{App, Arg};
use env_logger::Env;
use log::{error, info};
use serde::Deserialize;

use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::fs;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

#[derive(Deserialize, Debug)]
struct ClientConfig {
    host: String,
    port: String,
}

fn process_input(stream: &mut TcpStream, line: &str) -> bool {
    stream.write_all(format!("{}\n", line).as_bytes()).unwrap();

    let mut data = [0u8; 8192];
    match stream.read(&mut data) {
        Ok(size) => {
            let s = String::from_utf8_lossy(&data[..size]);
            // Quit command received from the server.
            if s.starts_with('\\') {
                if s.starts_with("\\quit") {
                    info!("Received Quit Command");
                    return false;
                }
                info!("command received {}", s);
                return true;
            }
            println!("{}", s);
            true
        }
        Err(_) => true,
    }
}

#[allow(unused_must_use)]
fn process_cli_input(stream: &mut TcpStream) {
    let mut rl = Editor::<()>::new();
    if rl.load_history("history.txt").is_err() {
        info!("No previous history.");
    }
    let prompt: &str = "[quarrydb]>>";
    let mut cont = true;
    while cont {
        let readline = rl.readline(prompt);
        match readline {
            Ok(line) => {
                if line.as_str() == "" {
                    continue;
                }
                rl.add_history_entry(line.as_str());
                cont = process_input(stream, line.as_str());
            }
            Err(ReadlineError::Interrupted) => {
                info!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                info!("CTRL-D");
                break;
            }
            Err(err) => {
                error!("Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history("history.txt").unwrap();
    stream.shutdown(Shutdown::Both);
}

#[allow(unused_must_use)]
fn process_script_input(stream: &mut TcpStream, script: String) {
    for line in script.split(';') {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        let clean_command = command.replace('\n', " ");
        info!("Script clean command: {}", clean_command);
        if !process_input(stream, &clean_command) {
            panic!("Bad Script");
        }
    }
    stream.shutdown(Shutdown::Both);
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("quarrydb client")
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
                .default_value("0.0.0.0")
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
            Arg::with_name("script")
                .short("s")
                .long("script")
                .value_name("QUARRY_SCRIPT")
                .help("Takes a semicolon delimited file of commands and SQL queries.")
                .takes_value(true)
                .required(false),
        )
        .get_matches();

    let config: ClientConfig = if let Some(c) = matches.value_of("config") {
        let contents = fs::read_to_string(c).unwrap();
        serde_json::from_str(&contents).unwrap()
    } else {
        ClientConfig {
            host: matches.value_of("host").unwrap().to_string(),
            port: matches.value_of("port").unwrap().to_string(),
        }
    };

    info!("Starting client with config: {:?}", config);

    let script: String = if let Some(s) = matches.value_of("script") {
        fs::read_to_string(s).unwrap()
    } else {
        String::new()
    };

    let mut bind_addr = config.host.clone();
    bind_addr.push(':');
    bind_addr.push_str(&config.port);

    match TcpStream::connect(bind_addr) {
        Ok(mut stream) => {
            if script.is_empty() {
                process_cli_input(&mut stream);
            } else {
                process_script_input(&mut stream, script);
            }
        }
        Err(e) => {
            error!("Failed to connect: {}", e);
        }
    }
    info!("Terminated.");
}
