use std::collections::HashMap;

use clap::{App, Arg, SubCommand};

fn parse_peers_file(path: &str) -> HashMap<String, String> {
    concord_core::config::ParticipantsConfig::from_file(path)
        .map(|c| {
            c.participants
                .into_iter()
                .map(|(name, r)| (name, r.address))
                .collect()
        })
        .unwrap_or_default()
}

fn main() {
    let matches = App::new("concord")
        .version("0.1.0")
        .about("Raft consensus and 2PC transaction coordination for the coursework platform.")
        .subcommand(
            SubCommand::with_name("raft")
                .about("Runs a Raft cluster member.")
                .arg(Arg::with_name("cluster").long("cluster").takes_value(true).required(true))
                .arg(Arg::with_name("node").long("node").takes_value(true).required(true))
                .arg(
                    Arg::with_name("config")
                        .long("config")
                        .takes_value(true)
                        .required(true)
                        .default_value("Config.toml"),
                ),
        )
        .subcommand(
            SubCommand::with_name("participant")
                .about("Runs a 2PC participant holding one account.")
                .arg(Arg::with_name("address").long("address").takes_value(true).required(true))
                .arg(Arg::with_name("account").long("account").takes_value(true).required(true))
                .arg(
                    Arg::with_name("initial-balance")
                        .long("initial-balance")
                        .takes_value(true)
                        .required(true),
                )
                .arg(Arg::with_name("peers").long("peers").takes_value(true).required(false)),
        )
        .subcommand(
            SubCommand::with_name("coordinator")
                .about("Runs a 2PC coordinator over a fixed set of participants.")
                .arg(Arg::with_name("address").long("address").takes_value(true).required(true))
                .arg(
                    Arg::with_name("timeout-ms")
                        .long("timeout-ms")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("participants")
                        .long("participants")
                        .takes_value(true)
                        .required(true),
                )
                .arg(Arg::with_name("peers").long("peers").takes_value(true).required(false)),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("raft", Some(m)) => concord::run_raft(
            m.value_of("cluster").unwrap(),
            m.value_of("node").unwrap(),
            m.value_of("config").unwrap(),
        ),
        ("participant", Some(m)) => {
            let initial_balance: i64 = m
                .value_of("initial-balance")
                .unwrap()
                .parse()
                .expect("--initial-balance must be an integer");
            let raft_peers = m.value_of("peers").map(parse_peers_file);
            concord::run_participant(
                m.value_of("address").unwrap(),
                m.value_of("account").unwrap(),
                initial_balance,
                raft_peers,
            )
        }
        ("coordinator", Some(m)) => {
            let timeout_ms: u64 = m
                .value_of("timeout-ms")
                .unwrap()
                .parse()
                .expect("--timeout-ms must be an integer");
            let raft_peers = m.value_of("peers").map(parse_peers_file);
            concord::run_coordinator(
                m.value_of("address").unwrap(),
                timeout_ms,
                m.value_of("participants").unwrap(),
                raft_peers,
            )
        }
        _ => {
            eprintln!("{}", matches.usage());
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("fatal: {}", e);
        std::process::exit(1);
    }
}
