use crate::domain::transform::TransformRequest;
use crate::ports::hop::{ChainError, ChunkStream, HopClient};
use crate::ports::resolver::ServiceInstance;
use crate::proto::transformer::transformer_service_client::TransformerServiceClient;
use crate::proto::transformer::TransformVideoRequest;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tonic::transport::Channel;

/// Opens a fresh connection per hop call.
#[derive(Clone, Debug)]
pub struct GrpcHopClient {
    connect_timeout: Duration,
}

impl Default for GrpcHopClient {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl GrpcHopClient {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl HopClient for GrpcHopClient {
    async fn transform(
        &self,
        instance: &ServiceInstance,
        request: TransformRequest,
    ) -> Result<ChunkStream, ChainError> {
        let unreachable = |reason: String| ChainError::Unreachable {
            name: instance.name.clone(),
            reason,
        };
        let channel = Channel::from_shared(instance.endpoint())
            .map_err(|e| unreachable(e.to_string()))?
            .connect_timeout(self.connect_timeout)
            .connect()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let response = TransformerServiceClient::new(channel)
            .transform_video(TransformVideoRequest {
                videopath: request.video_path,
                transformer_list: request.transformers,
            })
            .await
            .map_err(ChainError::Downstream)?;

        let chunks = response.into_inner().map(|message| {
            message
                .map(|response| response.chunk)
                .map_err(ChainError::Downstream)
        });
        Ok(Box::pin(chunks))
    }
}
