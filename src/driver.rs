//! The public driver facade: connection lifecycle, the generic table
//! surface and the worked IPv4 route operation.

use std::net::Ipv4Addr;

use log::{debug, error, info};
use rand::Rng;

use crate::bfrt::{update, Entity, Update};
use crate::entry::{build_key_entity, build_table_operation, build_table_update, ActionCall, KeyMatch};
use crate::error::DriverError;
use crate::ports;
use crate::schema::{Namespace, PipelineSchema};
use crate::session::Session;
use crate::transport::{GrpcTransport, Transport};

// Route surface of the fixed P4 program.
const IPV4_LPM_TABLE: &str = "pipe.SwitchIngress.ipv4_lpm";
const IPV4_DST_KEY: &str = "hdr.ipv4.dstAddr";
const IPV4_FORWARD_ACTION: &str = "SwitchIngress.ipv4_forward";
const NEXT_HOP_MAC_PARAM: &str = "dstAddr";
const EGRESS_PORT_PARAM: &str = "port";
const HOST_ROUTE_PREFIX_LEN: i32 = 32;

/// Connection settings for one device.
#[derive(Debug, Clone)]
pub struct DriverConfig {
	pub host: String,
	pub port: u16,
	/// Name of the P4 program to bind to.
	pub p4_name: String,
	pub device_id: u32,
	/// First client id to offer when subscribing. Drawn at random from
	/// 0..100 when absent.
	pub client_id: Option<u32>,
}

impl Default for DriverConfig {
	fn default() -> Self {
		DriverConfig {
			host: "127.0.0.1".to_string(),
			port: 50052,
			p4_name: "db_join".to_string(),
			device_id: 0,
			client_id: None,
		}
	}
}

/// Control-plane driver for one BFRuntime device.
///
/// Operations take `&mut self`; a driver shared across tasks belongs behind
/// the caller's own lock.
pub struct TofinoDriver<T = GrpcTransport> {
	config: DriverConfig,
	initial_client_id: u32,
	session: Option<Session<T>>,
}

impl<T: Transport> TofinoDriver<T> {
	pub fn new(config: DriverConfig) -> Self {
		let initial_client_id = match config.client_id {
			Some(id) => id,
			None => rand::thread_rng().gen_range(0..100),
		};
		TofinoDriver {
			config,
			initial_client_id,
			session: None,
		}
	}

	pub fn is_connected(&self) -> bool {
		self.session.is_some()
	}

	/// The negotiated client id once connected, otherwise the first id the
	/// next connect will offer.
	pub fn client_id(&self) -> u32 {
		match &self.session {
			Some(session) => session.client_id,
			None => self.initial_client_id,
		}
	}

	/// The parsed table schemas, available while connected.
	pub fn schema(&self) -> Option<&PipelineSchema> {
		self.session.as_ref().map(|session| &session.schema)
	}

	/// Run the handshake over a caller-supplied transport. A driver that is
	/// already connected keeps its session and returns immediately.
	pub async fn connect_with(&mut self, transport: T) -> Result<(), DriverError> {
		if self.session.is_some() {
			return Ok(());
		}
		match Session::establish(
			transport,
			&self.config.p4_name,
			self.config.device_id,
			self.initial_client_id,
		)
		.await
		{
			Ok(session) => {
				self.session = Some(session);
				Ok(())
			}
			Err(err) => {
				error!(
					"Connect to {}:{} failed: {}",
					self.config.host, self.config.port, err
				);
				Err(err)
			}
		}
	}

	/// Drop the session, which closes the control stream and the channel.
	/// Harmless when already disconnected.
	pub fn disconnect(&mut self) {
		if self.session.take().is_some() {
			info!("Disconnected from {}:{}", self.config.host, self.config.port);
		}
	}

	fn session_mut(&mut self) -> Result<&mut Session<T>, DriverError> {
		self.session.as_mut().ok_or(DriverError::NotConnected)
	}

	async fn mutate(
		&mut self,
		kind: update::Type,
		namespace: Namespace,
		table: &str,
		keys: Vec<KeyMatch>,
		action: Option<&ActionCall>,
	) -> Result<(), DriverError> {
		let session = self.session_mut()?;
		let update =
			build_table_update(session.schema.tables(namespace), kind, table, keys, action)?;
		session
			.write_update(update)
			.await
			.map_err(|status| DriverError::Rpc {
				context: format!("{:?} on {}", kind, table),
				source: status,
			})?;
		debug!("{:?} on {} acknowledged", kind, table);
		Ok(())
	}

	pub async fn insert_entry(
		&mut self,
		namespace: Namespace,
		table: &str,
		keys: Vec<KeyMatch>,
		action: &ActionCall,
	) -> Result<(), DriverError> {
		self.mutate(update::Type::Insert, namespace, table, keys, Some(action))
			.await
	}

	pub async fn modify_entry(
		&mut self,
		namespace: Namespace,
		table: &str,
		keys: Vec<KeyMatch>,
		action: &ActionCall,
	) -> Result<(), DriverError> {
		self.mutate(update::Type::Modify, namespace, table, keys, Some(action))
			.await
	}

	/// Remove the entry matching the given key fields. Deletes carry no
	/// action payload.
	pub async fn delete_entry(
		&mut self,
		namespace: Namespace,
		table: &str,
		keys: Vec<KeyMatch>,
	) -> Result<(), DriverError> {
		self.mutate(update::Type::Delete, namespace, table, keys, None)
			.await
	}

	/// Read the entries matching the given key fields. An empty result is
	/// an empty list, not an error.
	pub async fn read_entry(
		&mut self,
		namespace: Namespace,
		table: &str,
		keys: Vec<KeyMatch>,
	) -> Result<Vec<Entity>, DriverError> {
		let session = self.session_mut()?;
		let lookup = build_key_entity(session.schema.tables(namespace), table, keys)?;
		session
			.read_entities(vec![lookup])
			.await
			.map_err(|status| DriverError::Rpc {
				context: format!("reading {}", table),
				source: status,
			})
	}

	/// Run a named whole-table maintenance operation, e.g. "Sync" to flush
	/// device counters to software before a read.
	pub async fn run_table_operation(
		&mut self,
		namespace: Namespace,
		table: &str,
		operation: &str,
	) -> Result<(), DriverError> {
		let session = self.session_mut()?;
		let entity = build_table_operation(session.schema.tables(namespace), table, operation)?;
		let update = Update {
			r#type: update::Type::Insert as i32,
			entity: Some(entity),
		};
		session
			.write_update(update)
			.await
			.map_err(|status| DriverError::Rpc {
				context: format!("{} on {}", operation, table),
				source: status,
			})?;
		debug!("{} on {} acknowledged", operation, table);
		Ok(())
	}

	/// Resolve a front-panel port name such as "2/0" to its two-byte
	/// dev-port id, consulting the session cache first.
	pub async fn resolve_port_id(&mut self, name: &str) -> Result<Vec<u8>, DriverError> {
		let session = self.session_mut()?;
		ports::resolve_port_id(session, name).await
	}

	/// Install a host route: traffic to `destination` is rewritten to the
	/// next-hop MAC and sent out the named front-panel port.
	pub async fn add_ipv4_route(
		&mut self,
		destination: Ipv4Addr,
		next_hop_mac: [u8; 6],
		egress_port: &str,
	) -> Result<(), DriverError> {
		let port_id = self.resolve_port_id(egress_port).await?;
		let keys = vec![KeyMatch::lpm(
			IPV4_DST_KEY,
			destination.octets().to_vec(),
			HOST_ROUTE_PREFIX_LEN,
		)];
		let action = ActionCall::new(IPV4_FORWARD_ACTION)
			.param(NEXT_HOP_MAC_PARAM, next_hop_mac.to_vec())
			.param(EGRESS_PORT_PARAM, port_id);
		self.insert_entry(Namespace::P4, IPV4_LPM_TABLE, keys, &action)
			.await?;
		info!(
			"Route {}/{} installed via port {}",
			destination, HOST_ROUTE_PREFIX_LEN, egress_port
		);
		Ok(())
	}
}

impl TofinoDriver<GrpcTransport> {
	/// Dial the configured endpoint and run the handshake. A driver that is
	/// already connected returns immediately without dialing.
	pub async fn connect(&mut self) -> Result<(), DriverError> {
		if self.session.is_some() {
			return Ok(());
		}
		let transport = match GrpcTransport::connect(&self.config.host, self.config.port).await {
			Ok(transport) => transport,
			Err(err) => {
				error!(
					"Connect to {}:{} failed: {}",
					self.config.host, self.config.port, err
				);
				return Err(err);
			}
		};
		self.connect_with(transport).await
	}
}
