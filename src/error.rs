use thiserror::Error;

/// Driver failure taxonomy.
///
/// Connection and schema-parse failures are fatal to the connect attempt
/// that raised them and always leave the driver disconnected. Resolution
/// and remote-operation failures are returned to the caller of the
/// specific operation; the session stays usable.
#[derive(Debug, Error)]
pub enum DriverError {
	#[error("not connected to the switch")]
	NotConnected,

	#[error("connecting to {addr} failed: {source}")]
	Connect {
		addr: String,
		#[source]
		source: tonic::transport::Error,
	},

	#[error("subscribe gave up after {attempts} attempts, last client id {client_id}: {detail}")]
	SubscribeExhausted {
		attempts: u32,
		client_id: u32,
		detail: String,
	},

	#[error("bind of program {p4_name} did not start warm init: {detail}")]
	BindRejected { p4_name: String, detail: String },

	#[error("device returned no forwarding pipeline config")]
	MissingPipelineConfig,

	#[error("malformed table schema payload: {0}")]
	SchemaParse(#[from] serde_json::Error),

	#[error("table {0} not found in schema")]
	TableNotFound(String),

	#[error("key {key} not found in table {table}")]
	KeyNotFound { table: String, key: String },

	#[error("action {action} not found in table {table}")]
	ActionNotFound { table: String, action: String },

	#[error("parameter {field} not found in table {table} action {action}")]
	DataFieldNotFound {
		table: String,
		action: String,
		field: String,
	},

	#[error("port {0} does not exist")]
	PortNotFound(String),

	#[error("{context} failed: {source}")]
	Rpc {
		context: String,
		#[source]
		source: tonic::Status,
	},

	#[error("unusable device response: {0}")]
	BadResponse(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolution_errors_name_the_missing_item() {
		let err = DriverError::KeyNotFound {
			table: "pipe.SwitchIngress.ipv4_lpm".to_string(),
			key: "hdr.ipv4.dstAddr".to_string(),
		};
		assert_eq!(
			err.to_string(),
			"key hdr.ipv4.dstAddr not found in table pipe.SwitchIngress.ipv4_lpm"
		);

		let err = DriverError::PortNotFound("2/0".to_string());
		assert_eq!(err.to_string(), "port 2/0 does not exist");
	}

	#[test]
	fn rpc_errors_keep_their_source() {
		use std::error::Error;

		let err = DriverError::Rpc {
			context: "Insert on pipe.SwitchIngress.ipv4_lpm".to_string(),
			source: tonic::Status::internal("boom"),
		};
		assert!(err.to_string().starts_with("Insert on pipe.SwitchIngress.ipv4_lpm failed"));
		assert!(err.source().is_some());
	}
}
