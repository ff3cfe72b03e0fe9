//! Runtime-delivered table schema: serde models for the BFRuntime info
//! payload and the name resolution indexes built over it once per connect.

use std::collections::HashMap;

use serde::Deserialize;

/// Root of one BFRuntime info payload. The device serves one of these per
/// table namespace; unknown fields in the JSON are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct BfrtInfo {
	#[serde(default)]
	pub schema_version: Option<String>,
	#[serde(default)]
	pub tables: Vec<Table>,
}

/// One match-action unit as described by the device.
#[derive(Debug, Clone, Deserialize)]
pub struct Table {
	pub name: String,
	pub id: u32,
	#[serde(default)]
	pub key: Vec<Key>,
	#[serde(default)]
	pub action_specs: Vec<ActionSpec>,
}

/// A named key field. The match kind is decided per request, not stored
/// here.
#[derive(Debug, Clone, Deserialize)]
pub struct Key {
	pub name: String,
	pub id: u32,
}

/// A named action with its parameters in declaration order.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionSpec {
	pub name: String,
	pub id: u32,
	#[serde(default)]
	pub data: Vec<DataField>,
}

/// One action parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct DataField {
	pub name: String,
	pub id: u32,
}

/// The two disjoint table namespaces a device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
	/// Tables defined by the bound P4 program.
	P4,
	/// Device-intrinsic tables (ports, mirrors, ...), present regardless
	/// of the loaded program.
	NonP4,
}

/// One namespace of tables with a hashed table-name index. Lookups below
/// the table level stay linear; key, action and parameter lists hold a
/// handful of entries each.
#[derive(Debug, Default)]
pub struct TableSet {
	tables: Vec<Table>,
	by_name: HashMap<String, usize>,
}

impl TableSet {
	/// Deserialize one BFRuntime info payload and index it.
	pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
		let info: BfrtInfo = serde_json::from_slice(payload)?;
		Ok(Self::new(info.tables))
	}

	pub fn new(tables: Vec<Table>) -> Self {
		let by_name = tables
			.iter()
			.enumerate()
			.map(|(pos, table)| (table.name.clone(), pos))
			.collect();
		Self { tables, by_name }
	}

	pub fn len(&self) -> usize {
		self.tables.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tables.is_empty()
	}

	pub fn table(&self, name: &str) -> Option<&Table> {
		self.by_name.get(name).map(|&pos| &self.tables[pos])
	}

	pub fn table_id(&self, name: &str) -> Option<u32> {
		self.table(name).map(|table| table.id)
	}

	pub fn key_id(&self, table: &str, key: &str) -> Option<u32> {
		self.table(table)?
			.key
			.iter()
			.find(|k| k.name == key)
			.map(|k| k.id)
	}

	pub fn action_id(&self, table: &str, action: &str) -> Option<u32> {
		self.table(table)?
			.action_specs
			.iter()
			.find(|a| a.name == action)
			.map(|a| a.id)
	}

	pub fn data_field_id(&self, table: &str, action: &str, field: &str) -> Option<u32> {
		self.table(table)?
			.action_specs
			.iter()
			.find(|a| a.name == action)?
			.data
			.iter()
			.find(|d| d.name == field)
			.map(|d| d.id)
	}
}

/// Both table namespaces of a bound device, indexed independently.
/// Rebuilt from scratch on every connect, never patched in place.
#[derive(Debug, Default)]
pub struct PipelineSchema {
	pub p4: TableSet,
	pub non_p4: TableSet,
}

impl PipelineSchema {
	pub fn tables(&self, namespace: Namespace) -> &TableSet {
		match namespace {
			Namespace::P4 => &self.p4,
			Namespace::NonP4 => &self.non_p4,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	// Trimmed from a real bf-rt.json; carries the annotations and type
	// metadata the models are expected to skip over.
	const PROGRAM_INFO: &str = r#"{
		"schema_version": "1.0.0",
		"tables": [
			{
				"name": "pipe.SwitchIngress.ipv4_lpm",
				"id": 7,
				"table_type": "MatchAction_Direct",
				"size": 1024,
				"annotations": [],
				"key": [
					{
						"id": 1,
						"name": "hdr.ipv4.dstAddr",
						"repeated": false,
						"mandatory": true,
						"match_type": "LPM",
						"type": {"type": "bytes", "width": 32}
					}
				],
				"action_specs": [
					{
						"id": 3,
						"name": "SwitchIngress.ipv4_forward",
						"action_scope": "TableAndDefault",
						"annotations": [],
						"data": [
							{"id": 10, "name": "dstAddr", "repeated": false, "mandatory": true, "read_only": false, "type": {"type": "bytes", "width": 48}},
							{"id": 11, "name": "port", "repeated": false, "mandatory": true, "read_only": false, "type": {"type": "bytes", "width": 9}}
						]
					}
				]
			}
		]
	}"#;

	const FIXED_INFO: &str = r#"{
		"tables": [
			{
				"name": "$PORT_STR_INFO",
				"id": 4278386696,
				"table_type": "PortStrInfo",
				"size": 256,
				"key": [
					{"id": 1, "name": "$PORT_NAME", "repeated": false, "mandatory": true, "match_type": "Exact", "type": {"type": "string"}}
				],
				"data": [
					{"mandatory": false, "read_only": false, "singleton": {"id": 1, "name": "$DEV_PORT", "repeated": false, "type": {"type": "uint32"}}}
				]
			}
		]
	}"#;

	fn program_set() -> TableSet {
		TableSet::parse(PROGRAM_INFO.as_bytes()).unwrap()
	}

	#[test]
	fn parses_tables_and_resolves_every_level() {
		let set = program_set();
		assert_eq!(set.len(), 1);
		assert_eq!(set.table_id("pipe.SwitchIngress.ipv4_lpm"), Some(7));
		assert_eq!(set.key_id("pipe.SwitchIngress.ipv4_lpm", "hdr.ipv4.dstAddr"), Some(1));
		assert_eq!(
			set.action_id("pipe.SwitchIngress.ipv4_lpm", "SwitchIngress.ipv4_forward"),
			Some(3)
		);
		assert_eq!(
			set.data_field_id("pipe.SwitchIngress.ipv4_lpm", "SwitchIngress.ipv4_forward", "dstAddr"),
			Some(10)
		);
		assert_eq!(
			set.data_field_id("pipe.SwitchIngress.ipv4_lpm", "SwitchIngress.ipv4_forward", "port"),
			Some(11)
		);
	}

	#[test]
	fn resolution_is_deterministic() {
		let set = program_set();
		for _ in 0..3 {
			assert_eq!(set.table_id("pipe.SwitchIngress.ipv4_lpm"), Some(7));
			assert_eq!(set.key_id("pipe.SwitchIngress.ipv4_lpm", "hdr.ipv4.dstAddr"), Some(1));
		}
	}

	#[test]
	fn unknown_names_resolve_to_none() {
		let set = program_set();
		assert_eq!(set.table_id("no_such_table"), None);
		assert_eq!(set.key_id("pipe.SwitchIngress.ipv4_lpm", "no_such_key"), None);
		assert_eq!(set.action_id("pipe.SwitchIngress.ipv4_lpm", "no_such_action"), None);
		assert_eq!(
			set.data_field_id("pipe.SwitchIngress.ipv4_lpm", "SwitchIngress.ipv4_forward", "ttl"),
			None
		);
		// Parameters only resolve through their own action.
		assert_eq!(
			set.data_field_id("pipe.SwitchIngress.ipv4_lpm", "no_such_action", "port"),
			None
		);
	}

	#[test]
	fn fixed_tables_parse_without_action_specs() {
		let set = TableSet::parse(FIXED_INFO.as_bytes()).unwrap();
		assert_eq!(set.table_id("$PORT_STR_INFO"), Some(4278386696));
		assert_eq!(set.key_id("$PORT_STR_INFO", "$PORT_NAME"), Some(1));
		assert_eq!(set.action_id("$PORT_STR_INFO", "anything"), None);
	}

	#[test]
	fn namespaces_do_not_leak_into_each_other() {
		let schema = PipelineSchema {
			p4: program_set(),
			non_p4: TableSet::parse(FIXED_INFO.as_bytes()).unwrap(),
		};
		assert_eq!(schema.tables(Namespace::P4).table_id("$PORT_STR_INFO"), None);
		assert_eq!(
			schema.tables(Namespace::NonP4).table_id("pipe.SwitchIngress.ipv4_lpm"),
			None
		);
		assert_eq!(schema.tables(Namespace::NonP4).table_id("$PORT_STR_INFO"), Some(4278386696));
	}

	#[test]
	fn malformed_payload_is_an_error() {
		assert!(TableSet::parse(b"{ not json").is_err());
		assert!(TableSet::parse(br#"{"tables": [{"id": 1}]}"#).is_err());
	}
}
