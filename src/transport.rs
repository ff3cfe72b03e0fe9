//! Transport seam between the driver and the device's BFRuntime service.
//!
//! The [`Transport`] trait carries exactly the five control operations the
//! driver performs; [`GrpcTransport`] is the production implementation.
//! Tests substitute a scripted implementation to observe calls.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status, Streaming};

use crate::bfrt::bf_runtime_client::BfRuntimeClient;
use crate::bfrt::{
	GetForwardingPipelineConfigRequest, GetForwardingPipelineConfigResponse, ReadRequest,
	ReadResponse, SetForwardingPipelineConfigRequest, SetForwardingPipelineConfigResponse,
	StreamMessageRequest, StreamMessageResponse, WriteRequest, WriteResponse,
};
use crate::error::DriverError;

/// Dial timeout for the control connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// BFRuntime info payloads for a full pipeline run to megabytes, well past
/// the tonic default cap.
const MAX_INBOUND_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

const STREAM_BUFFER: usize = 12;

/// The control operations the driver performs against one device.
#[async_trait]
pub trait Transport: Send {
	/// Send one subscribe request on the control stream and wait for the
	/// device's acknowledgment message.
	async fn subscribe(
		&mut self,
		request: StreamMessageRequest,
	) -> Result<StreamMessageResponse, Status>;

	async fn set_forwarding_pipeline_config(
		&mut self,
		request: SetForwardingPipelineConfigRequest,
	) -> Result<SetForwardingPipelineConfigResponse, Status>;

	async fn get_forwarding_pipeline_config(
		&mut self,
		request: GetForwardingPipelineConfigRequest,
	) -> Result<GetForwardingPipelineConfigResponse, Status>;

	async fn write(&mut self, request: WriteRequest) -> Result<WriteResponse, Status>;

	/// Issue a read and collect every streamed response message.
	async fn read(&mut self, request: ReadRequest) -> Result<Vec<ReadResponse>, Status>;
}

/// gRPC transport over one tonic channel.
///
/// The outbound half of the control stream is fed through an mpsc sender.
/// The inbound half is opened lazily on the first subscribe: the device
/// sends nothing on the stream until a subscribe arrives, so the stream
/// RPC is only awaited once that first request is already queued.
pub struct GrpcTransport {
	client: BfRuntimeClient<Channel>,
	stream_tx: mpsc::Sender<StreamMessageRequest>,
	pending_rx: Option<mpsc::Receiver<StreamMessageRequest>>,
	stream_rx: Option<Streaming<StreamMessageResponse>>,
}

impl GrpcTransport {
	/// Dial the device's control endpoint.
	pub async fn connect(host: &str, port: u16) -> Result<Self, DriverError> {
		let addr = format!("http://{}:{}", host, port);
		let endpoint = Endpoint::from_shared(addr.clone())
			.map_err(|source| DriverError::Connect {
				addr: addr.clone(),
				source,
			})?
			.connect_timeout(CONNECT_TIMEOUT);
		let channel = endpoint
			.connect()
			.await
			.map_err(|source| DriverError::Connect { addr, source })?;
		let client =
			BfRuntimeClient::new(channel).max_decoding_message_size(MAX_INBOUND_MESSAGE_BYTES);
		let (stream_tx, pending_rx) = mpsc::channel(STREAM_BUFFER);
		Ok(Self {
			client,
			stream_tx,
			pending_rx: Some(pending_rx),
			stream_rx: None,
		})
	}

	async fn ensure_stream(&mut self) -> Result<(), Status> {
		if self.stream_rx.is_some() {
			return Ok(());
		}
		let mut rx = self
			.pending_rx
			.take()
			.ok_or_else(|| Status::internal("control stream receiver already consumed"))?;
		let outbound = async_stream::stream! {
			while let Some(message) = rx.recv().await {
				yield message;
			}
		};
		let response = self.client.stream_channel(Request::new(outbound)).await?;
		self.stream_rx = Some(response.into_inner());
		Ok(())
	}
}

#[async_trait]
impl Transport for GrpcTransport {
	async fn subscribe(
		&mut self,
		request: StreamMessageRequest,
	) -> Result<StreamMessageResponse, Status> {
		self.stream_tx
			.send(request)
			.await
			.map_err(|_| Status::unavailable("control stream closed"))?;
		self.ensure_stream().await?;
		let stream = match self.stream_rx.as_mut() {
			Some(stream) => stream,
			None => return Err(Status::internal("control stream not established")),
		};
		match stream.message().await? {
			Some(response) => Ok(response),
			None => Err(Status::aborted("control stream ended before the subscribe ack")),
		}
	}

	async fn set_forwarding_pipeline_config(
		&mut self,
		request: SetForwardingPipelineConfigRequest,
	) -> Result<SetForwardingPipelineConfigResponse, Status> {
		Ok(self
			.client
			.set_forwarding_pipeline_config(request)
			.await?
			.into_inner())
	}

	async fn get_forwarding_pipeline_config(
		&mut self,
		request: GetForwardingPipelineConfigRequest,
	) -> Result<GetForwardingPipelineConfigResponse, Status> {
		Ok(self
			.client
			.get_forwarding_pipeline_config(request)
			.await?
			.into_inner())
	}

	async fn write(&mut self, request: WriteRequest) -> Result<WriteResponse, Status> {
		Ok(self.client.write(request).await?.into_inner())
	}

	async fn read(&mut self, request: ReadRequest) -> Result<Vec<ReadResponse>, Status> {
		let mut stream = self.client.read(request).await?.into_inner();
		let mut responses = Vec::new();
		while let Some(message) = stream.message().await? {
			responses.push(message);
		}
		Ok(responses)
	}
}
