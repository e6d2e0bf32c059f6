use crate::application::chain::TransformChain;
use crate::domain::transform::TransformRequest;
use crate::ports::hop::ChainError;
use crate::ports::storage::StorageError;
use crate::proto::transformer::transformer_service_server::{
    TransformerService, TransformerServiceServer,
};
use crate::proto::transformer::{TransformVideoRequest, TransformVideoResponse};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

pub fn status_from(err: ChainError) -> Status {
    match err {
        ChainError::InvalidRoute(message) => Status::invalid_argument(message),
        ChainError::Storage(StorageError::NotFound(key)) => {
            Status::not_found(format!("object {} not found", key))
        }
        ChainError::Storage(StorageError::InvalidKey(key)) => {
            Status::invalid_argument(format!("invalid object key {:?}", key))
        }
        ChainError::Downstream(status) => status,
        e @ (ChainError::NoInstance(_)
        | ChainError::Unreachable { .. }
        | ChainError::Resolver(_)) => Status::unavailable(e.to_string()),
        e => Status::internal(e.to_string()),
    }
}

pub struct TransformerGrpc {
    chain: Arc<TransformChain>,
}

impl TransformerGrpc {
    pub fn new(chain: Arc<TransformChain>) -> Self {
        Self { chain }
    }
}

#[tonic::async_trait]
impl TransformerService for TransformerGrpc {
    type TransformVideoStream =
        Pin<Box<dyn Stream<Item = Result<TransformVideoResponse, Status>> + Send + 'static>>;

    async fn transform_video(
        &self,
        request: Request<TransformVideoRequest>,
    ) -> Result<Response<Self::TransformVideoStream>, Status> {
        let req = request.into_inner();
        info!(
            hop = self.chain.name(),
            path = %req.videopath,
            transformers = ?req.transformer_list,
            "transform request"
        );

        let chunks = self
            .chain
            .transform(TransformRequest::new(req.videopath, req.transformer_list))
            .await
            .map_err(|e| {
                warn!(hop = self.chain.name(), error = %e, "rejecting transform request");
                status_from(e)
            })?;

        let responses = chunks.map(|chunk| {
            chunk
                .map(|chunk| TransformVideoResponse { chunk })
                .map_err(status_from)
        });
        Ok(Response::new(Box::pin(responses)))
    }
}

/// Serve `chain` on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    chain: Arc<TransformChain>,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()>,
{
    if let Ok(addr) = listener.local_addr() {
        info!(hop = chain.name(), %addr, "gRPC server listening");
    }
    tonic::transport::Server::builder()
        .add_service(TransformerServiceServer::new(TransformerGrpc::new(chain)))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::resolver::ResolverError;
    use tonic::Code;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ChainError::InvalidRoute("empty".into()), Code::InvalidArgument),
            (ChainError::NoInstance("flip".into()), Code::Unavailable),
            (
                ChainError::Unreachable {
                    name: "flip".into(),
                    reason: "refused".into(),
                },
                Code::Unavailable,
            ),
            (
                ChainError::Resolver(ResolverError::Request("timeout".into())),
                Code::Unavailable,
            ),
            (
                ChainError::Storage(StorageError::NotFound("v1/x.ts".into())),
                Code::NotFound,
            ),
            (
                ChainError::Downstream(Status::data_loss("truncated")),
                Code::DataLoss,
            ),
            (ChainError::Transform("exit 1".into()), Code::Internal),
        ];

        for (err, code) in cases {
            let message = err.to_string();
            assert_eq!(status_from(err).code(), code, "{}", message);
        }
    }
}
