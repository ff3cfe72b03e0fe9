//! Command-line client: connect to a switch, install one IPv4 host route,
//! disconnect.

use std::net::Ipv4Addr;
use std::process::exit;
use std::str::FromStr;

use clap::{value_parser, Arg, Command};
use log::error;

use tofino_driver::{DriverConfig, TofinoDriver};

/// Colon- or hyphen-separated hardware address, e.g. `00:00:00:00:00:02`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MacAddr([u8; 6]);

impl FromStr for MacAddr {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let parts: Vec<&str> = if s.contains(':') {
			s.split(':').collect()
		} else {
			s.split('-').collect()
		};
		if parts.len() != 6 {
			return Err(format!("expected 6 octets, got {}", parts.len()));
		}
		let mut octets = [0u8; 6];
		for (i, part) in parts.iter().enumerate() {
			octets[i] = u8::from_str_radix(part, 16)
				.map_err(|_| format!("octet {:?} is not a hex byte", part))?;
		}
		Ok(MacAddr(octets))
	}
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
	let matches = Command::new("tofino-cp")
		.version("0.1.0")
		.about("BFRuntime control-plane client for Tofino switches")
		.arg(
			Arg::new("switch-host")
				.long("switch-host")
				.default_value("127.0.0.1"),
		)
		.arg(
			Arg::new("switch-port")
				.long("switch-port")
				.default_value("50052")
				.value_parser(value_parser!(u16)),
		)
		.arg(Arg::new("program").long("program").default_value("db_join"))
		.arg(Arg::new("dst").long("dst").required(true))
		.arg(Arg::new("next-hop-mac").long("next-hop-mac").required(true))
		.arg(Arg::new("egress-port").long("egress-port").required(true))
		.get_matches();

	let config = DriverConfig {
		host: matches.get_one::<String>("switch-host").unwrap().clone(),
		port: *matches.get_one::<u16>("switch-port").unwrap(),
		p4_name: matches.get_one::<String>("program").unwrap().clone(),
		device_id: 0,
		client_id: None,
	};
	let dst: Ipv4Addr = matches.get_one::<String>("dst").unwrap().parse()?;
	let mac: MacAddr = matches.get_one::<String>("next-hop-mac").unwrap().parse()?;
	let egress_port = matches.get_one::<String>("egress-port").unwrap().clone();

	let mut driver = TofinoDriver::new(config);
	driver.connect().await?;
	let outcome = driver.add_ipv4_route(dst, mac.0, &egress_port).await;
	driver.disconnect();
	outcome?;
	Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
	env_logger::init();
	if let Err(err) = run().await {
		error!("{}", err);
		exit(1);
	}
}
