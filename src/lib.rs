//! Control-plane driver for Intel Tofino switches speaking the BFRuntime
//! gRPC protocol.
//!
//! Connecting runs the full handshake: subscribe on the bidirectional
//! control stream (negotiating a free client id), bind to the target P4
//! program, then fetch and index the BFRuntime info payloads for both the
//! program's tables and the device-intrinsic ones. After that the driver
//! offers a generic name-based table surface (insert/modify/delete/read and
//! whole-table operations), front-panel port resolution backed by a
//! per-session cache, and a canned IPv4 host-route insertion built on both.
//!
//! All name-to-id resolution happens against the fetched schema before any
//! RPC is issued; an unresolvable table, key, action or parameter name
//! aborts the operation without touching the device.

pub mod google {
	pub mod rpc {
		tonic::include_proto!("google.rpc");
	}
}

pub mod bfrt {
	tonic::include_proto!("bfrt_proto"); // The string specified here must match the proto package name
}

mod driver;
mod entry;
mod error;
mod ports;
mod schema;
mod session;
mod transport;

pub use driver::{DriverConfig, TofinoDriver};
pub use entry::{ActionCall, KeyMatch, MatchValue};
pub use error::DriverError;
pub use schema::{
	ActionSpec, BfrtInfo, DataField, Key, Namespace, PipelineSchema, Table, TableSet,
};
pub use transport::{GrpcTransport, Transport};
