//! Generic table-entry construction. Callers speak in names; everything is
//! resolved against the loaded schema before a message is produced, and any
//! unknown name aborts the build before an RPC is issued.

use crate::bfrt::{
	data_field, entity, key_field, table_entry, update, DataField, Entity, KeyField, TableData,
	TableEntry, TableKey, TableOperation, Update,
};
use crate::error::DriverError;
use crate::schema::TableSet;

/// Value side of a key field, one variant per match kind the device
/// understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchValue {
	Exact { value: Vec<u8> },
	Lpm { value: Vec<u8>, prefix_len: i32 },
	Ternary { value: Vec<u8>, mask: Vec<u8> },
	Range { low: Vec<u8>, high: Vec<u8> },
}

/// One named key field and how to match it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatch {
	pub name: String,
	pub value: MatchValue,
}

impl KeyMatch {
	pub fn exact(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
		KeyMatch {
			name: name.into(),
			value: MatchValue::Exact { value: value.into() },
		}
	}

	pub fn lpm(name: impl Into<String>, value: impl Into<Vec<u8>>, prefix_len: i32) -> Self {
		KeyMatch {
			name: name.into(),
			value: MatchValue::Lpm {
				value: value.into(),
				prefix_len,
			},
		}
	}

	pub fn ternary(
		name: impl Into<String>,
		value: impl Into<Vec<u8>>,
		mask: impl Into<Vec<u8>>,
	) -> Self {
		KeyMatch {
			name: name.into(),
			value: MatchValue::Ternary {
				value: value.into(),
				mask: mask.into(),
			},
		}
	}

	pub fn range(name: impl Into<String>, low: impl Into<Vec<u8>>, high: impl Into<Vec<u8>>) -> Self {
		KeyMatch {
			name: name.into(),
			value: MatchValue::Range {
				low: low.into(),
				high: high.into(),
			},
		}
	}
}

/// An action invocation by name, with byte-encoded parameters in the order
/// they should appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
	pub name: String,
	pub params: Vec<(String, Vec<u8>)>,
}

impl ActionCall {
	pub fn new(name: impl Into<String>) -> Self {
		ActionCall {
			name: name.into(),
			params: Vec::new(),
		}
	}

	pub fn param(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
		self.params.push((name.into(), value.into()));
		self
	}
}

fn match_type(value: MatchValue) -> key_field::MatchType {
	match value {
		MatchValue::Exact { value } => key_field::MatchType::Exact(key_field::Exact { value }),
		MatchValue::Lpm { value, prefix_len } => {
			key_field::MatchType::Lpm(key_field::Lpm { value, prefix_len })
		}
		MatchValue::Ternary { value, mask } => {
			key_field::MatchType::Ternary(key_field::Ternary { value, mask })
		}
		MatchValue::Range { low, high } => key_field::MatchType::Range(key_field::Range { low, high }),
	}
}

fn resolve_key_fields(
	set: &TableSet,
	table: &str,
	keys: Vec<KeyMatch>,
) -> Result<Vec<KeyField>, DriverError> {
	keys.into_iter()
		.map(|key| {
			let field_id = set
				.key_id(table, &key.name)
				.ok_or_else(|| DriverError::KeyNotFound {
					table: table.to_string(),
					key: key.name.clone(),
				})?;
			Ok(KeyField {
				field_id,
				match_type: Some(match_type(key.value)),
			})
		})
		.collect()
}

fn resolve_action(
	set: &TableSet,
	table: &str,
	call: &ActionCall,
) -> Result<TableData, DriverError> {
	let action_id = set
		.action_id(table, &call.name)
		.ok_or_else(|| DriverError::ActionNotFound {
			table: table.to_string(),
			action: call.name.clone(),
		})?;
	let fields = call
		.params
		.iter()
		.map(|(name, value)| {
			let field_id = set.data_field_id(table, &call.name, name).ok_or_else(|| {
				DriverError::DataFieldNotFound {
					table: table.to_string(),
					action: call.name.clone(),
					field: name.clone(),
				}
			})?;
			Ok(DataField {
				field_id,
				value: Some(data_field::Value::Stream(value.clone())),
			})
		})
		.collect::<Result<Vec<_>, DriverError>>()?;
	Ok(TableData { action_id, fields })
}

fn key_entry(set: &TableSet, table: &str, keys: Vec<KeyMatch>) -> Result<TableEntry, DriverError> {
	let table_id = set
		.table_id(table)
		.ok_or_else(|| DriverError::TableNotFound(table.to_string()))?;
	let fields = resolve_key_fields(set, table, keys)?;
	Ok(TableEntry {
		table_id,
		data: None,
		is_default_entry: false,
		table_read_flag: None,
		table_mod_inc_flag: None,
		entry_tgt: None,
		table_flags: None,
		value: Some(table_entry::Value::Key(TableKey { fields })),
	})
}

/// Build one mutation of the given kind. `action` is required for inserts
/// and modifies and absent for deletes, which key on the match fields alone.
pub(crate) fn build_table_update(
	set: &TableSet,
	kind: update::Type,
	table: &str,
	keys: Vec<KeyMatch>,
	action: Option<&ActionCall>,
) -> Result<Update, DriverError> {
	let mut entry = key_entry(set, table, keys)?;
	if let Some(call) = action {
		entry.data = Some(resolve_action(set, table, call)?);
	}
	Ok(Update {
		r#type: kind as i32,
		entity: Some(Entity {
			entity: Some(entity::Entity::TableEntry(entry)),
		}),
	})
}

/// Build a keyed entity for a read request.
pub(crate) fn build_key_entity(
	set: &TableSet,
	table: &str,
	keys: Vec<KeyMatch>,
) -> Result<Entity, DriverError> {
	let entry = key_entry(set, table, keys)?;
	Ok(Entity {
		entity: Some(entity::Entity::TableEntry(entry)),
	})
}

/// Build a named whole-table operation, e.g. a counter sync.
pub(crate) fn build_table_operation(
	set: &TableSet,
	table: &str,
	operation: &str,
) -> Result<Entity, DriverError> {
	let table_id = set
		.table_id(table)
		.ok_or_else(|| DriverError::TableNotFound(table.to_string()))?;
	Ok(Entity {
		entity: Some(entity::Entity::TableOperation(TableOperation {
			table_id,
			table_operations_type: operation.to_string(),
		})),
	})
}
