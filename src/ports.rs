//! Front-panel port resolution. Port names like "2/0" are looked up in the
//! device-intrinsic $PORT_STR_INFO table and the resulting dev-port id is
//! cached for the life of the session.

use log::{debug, info};

use crate::bfrt::{data_field, entity};
use crate::entry::{build_key_entity, KeyMatch};
use crate::error::DriverError;
use crate::session::Session;
use crate::transport::Transport;

const PORT_INFO_TABLE: &str = "$PORT_STR_INFO";
const PORT_NAME_KEY: &str = "$PORT_NAME";

/// The device returns the dev-port id in a wider field; only the trailing
/// two bytes carry it.
fn port_id_bytes(field: &[u8]) -> Option<Vec<u8>> {
	if field.len() < 2 {
		return None;
	}
	Some(field[field.len() - 2..].to_vec())
}

/// Resolve a front-panel port name to its two-byte dev-port id, reading the
/// device at most once per name.
pub(crate) async fn resolve_port_id<T: Transport>(
	session: &mut Session<T>,
	name: &str,
) -> Result<Vec<u8>, DriverError> {
	if let Some(id) = session.port_cache.get(name) {
		debug!("Port {} resolved from cache", name);
		return Ok(id.clone());
	}

	let lookup = build_key_entity(
		&session.schema.non_p4,
		PORT_INFO_TABLE,
		vec![KeyMatch::exact(PORT_NAME_KEY, name.as_bytes())],
	)?;
	let entities = session
		.read_entities(vec![lookup])
		.await
		.map_err(|status| DriverError::Rpc {
			context: format!("reading port {}", name),
			source: status,
		})?;
	let entry = match entities.into_iter().next() {
		Some(entity) => match entity.entity {
			Some(entity::Entity::TableEntry(entry)) => entry,
			other => {
				return Err(DriverError::BadResponse(format!(
					"port read for {} returned a non-table entity: {:?}",
					name, other
				)))
			}
		},
		None => return Err(DriverError::PortNotFound(name.to_string())),
	};
	let field = entry
		.data
		.and_then(|data| data.fields.into_iter().next())
		.and_then(|field| match field.value {
			Some(data_field::Value::Stream(bytes)) => Some(bytes),
			_ => None,
		})
		.ok_or_else(|| {
			DriverError::BadResponse(format!("port read for {} carried no byte field", name))
		})?;
	let id = port_id_bytes(&field).ok_or_else(|| {
		DriverError::BadResponse(format!(
			"port id field for {} is {} bytes, expected at least 2",
			name,
			field.len()
		))
	})?;

	info!("Port {} resolved to dev port {:?}", name, id);
	session.port_cache.insert(name.to_string(), id.clone());
	Ok(id)
}
