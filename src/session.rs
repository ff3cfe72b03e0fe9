//! Session establishment and the client-scoped plumbing every operation
//! shares: the subscribe/bind/fetch handshake, device-wide targeting and
//! write/read framing.

use std::collections::HashMap;

use log::{info, warn};
use tonic::Status;

use crate::bfrt::set_forwarding_pipeline_config_request::{Action, DevInitMode};
use crate::bfrt::write_request::Atomicity;
use crate::bfrt::{
	stream_message_request, stream_message_response, subscribe, Entity, ForwardingPipelineConfig,
	GetForwardingPipelineConfigRequest, ReadRequest, SetForwardingPipelineConfigRequest,
	SetForwardingPipelineConfigResponseType, StreamMessageRequest, StreamMessageResponse,
	Subscribe, TargetDevice, Update, WriteRequest, WriteResponse,
};
use crate::error::DriverError;
use crate::schema::{PipelineSchema, TableSet};
use crate::transport::Transport;

/// Additional subscribe attempts after the first, each with the next
/// candidate client id.
pub(crate) const SUBSCRIBE_RETRIES: u32 = 3;

// Wildcard scope: all pipes, both directions, every parser.
const PIPE_ALL: u32 = 0xffff;
const DIRECTION_ALL: u32 = 0xff;
const PARSER_ALL: u32 = 0xff;

fn subscribe_request(client_id: u32, device_id: u32) -> StreamMessageRequest {
	StreamMessageRequest {
		client_id,
		update: Some(stream_message_request::Update::Subscribe(Subscribe {
			is_master: false,
			device_id,
			notifications: Some(subscribe::Notifications {
				enable_learn_notifications: true,
				enable_idletimeout_notifications: true,
				enable_port_status_change_notifications: false,
				enable_entry_active_notifications: false,
			}),
			status: None,
		})),
	}
}

/// A subscribe ack without a status, or with status code 0, is a grant.
fn subscribe_outcome(response: &StreamMessageResponse) -> Result<(), String> {
	match &response.update {
		Some(stream_message_response::Update::Subscribe(ack)) => match &ack.status {
			Some(status) if status.code != 0 => Err(format!(
				"status code {}: {}",
				status.code, status.message
			)),
			_ => Ok(()),
		},
		_ => Err("device answered with something other than a subscribe ack".to_string()),
	}
}

/// Live state of one established control session. Owns the transport, the
/// parsed schema and the port cache; dropping it tears everything down.
pub(crate) struct Session<T> {
	transport: T,
	pub(crate) client_id: u32,
	device_id: u32,
	p4_name: String,
	pub(crate) schema: PipelineSchema,
	pub(crate) port_cache: HashMap<String, Vec<u8>>,
}

impl<T: Transport> Session<T> {
	/// Run the full handshake: subscribe with bounded client-id
	/// negotiation, bind the target program, fetch and index both table
	/// schemas. Consumes the transport; on any failure it is dropped,
	/// which closes the stream and the channel.
	pub(crate) async fn establish(
		mut transport: T,
		p4_name: &str,
		device_id: u32,
		initial_client_id: u32,
	) -> Result<Self, DriverError> {
		let mut granted = None;
		let mut last_detail = String::new();
		for attempt in 0..=SUBSCRIBE_RETRIES {
			let candidate = initial_client_id + attempt;
			match transport
				.subscribe(subscribe_request(candidate, device_id))
				.await
			{
				Ok(ack) => match subscribe_outcome(&ack) {
					Ok(()) => {
						granted = Some(candidate);
						break;
					}
					Err(detail) => {
						warn!("Subscribe rejected for client id {}: {}", candidate, detail);
						last_detail = detail;
					}
				},
				Err(status) => {
					warn!("Subscribe failed for client id {}: {}", candidate, status);
					last_detail = status.to_string();
				}
			}
		}
		let client_id = granted.ok_or_else(|| DriverError::SubscribeExhausted {
			attempts: SUBSCRIBE_RETRIES + 1,
			client_id: initial_client_id + SUBSCRIBE_RETRIES,
			detail: last_detail,
		})?;
		info!("Subscribed to device {} as client {}", device_id, client_id);

		let bind = SetForwardingPipelineConfigRequest {
			device_id,
			client_id,
			action: Action::Bind as i32,
			dev_init_mode: DevInitMode::FastReconfig as i32,
			base_path: String::new(),
			config: vec![ForwardingPipelineConfig {
				p4_name: p4_name.to_string(),
				bfruntime_info: Vec::new(),
				profiles: Vec::new(),
			}],
		};
		let response = transport
			.set_forwarding_pipeline_config(bind)
			.await
			.map_err(|status| DriverError::BindRejected {
				p4_name: p4_name.to_string(),
				detail: status.to_string(),
			})?;
		let response_type = response.set_forwarding_pipeline_config_response_type;
		if response_type != SetForwardingPipelineConfigResponseType::WarmInitStarted as i32 {
			return Err(DriverError::BindRejected {
				p4_name: p4_name.to_string(),
				detail: format!("unexpected response type {}", response_type),
			});
		}
		info!("Bound program {}, warm init started", p4_name);

		let config = transport
			.get_forwarding_pipeline_config(GetForwardingPipelineConfigRequest {
				device_id,
				client_id,
			})
			.await
			.map_err(|status| DriverError::Rpc {
				context: "fetching the forwarding pipeline config".to_string(),
				source: status,
			})?;
		let program = config
			.config
			.first()
			.ok_or(DriverError::MissingPipelineConfig)?;
		let fixed = config
			.non_p4_config
			.as_ref()
			.ok_or(DriverError::MissingPipelineConfig)?;
		let p4 = TableSet::parse(&program.bfruntime_info)?;
		let non_p4 = TableSet::parse(&fixed.bfruntime_info)?;
		info!(
			"Schema loaded: {} program tables, {} fixed tables",
			p4.len(),
			non_p4.len()
		);

		Ok(Self {
			transport,
			client_id,
			device_id,
			p4_name: p4_name.to_string(),
			schema: PipelineSchema { p4, non_p4 },
			port_cache: HashMap::new(),
		})
	}

	/// Device-wide scope used by every read and write.
	fn target(&self) -> TargetDevice {
		TargetDevice {
			device_id: self.device_id,
			pipe_id: PIPE_ALL,
			direction: DIRECTION_ALL,
			prsr_id: PARSER_ALL,
		}
	}

	/// Send one mutation in its own continue-on-error write request.
	pub(crate) async fn write_update(&mut self, update: Update) -> Result<WriteResponse, Status> {
		let request = WriteRequest {
			target: Some(self.target()),
			client_id: self.client_id,
			updates: vec![update],
			atomicity: Atomicity::ContinueOnError as i32,
			p4_name: self.p4_name.clone(),
		};
		self.transport.write(request).await
	}

	/// Issue a device-scope read and flatten the streamed responses into
	/// one entity list.
	pub(crate) async fn read_entities(
		&mut self,
		entities: Vec<Entity>,
	) -> Result<Vec<Entity>, Status> {
		let request = ReadRequest {
			target: Some(self.target()),
			client_id: self.client_id,
			entities,
			p4_name: self.p4_name.clone(),
		};
		let responses = self.transport.read(request).await?;
		Ok(responses
			.into_iter()
			.flat_map(|response| response.entities)
			.collect())
	}
}
