//! Recursive transformer chain.
//!
//! A hop pops its own name off the transformer list. With nothing left it
//! reads the segment from storage, otherwise it streams it from the next hop.
//! Either way the bytes go through the hop's own subprocess and come back to
//! the caller chunk by chunk, with at most [`PIPELINE_DEPTH`] chunks in flight.

use super::relay::{drain_to_writer, pump_reader_to_stream, pump_stream_to_writer, CHUNK_SIZE};
use crate::domain::av::{CommandLine, TransformCommand};
use crate::domain::transform::TransformRequest;
use crate::ports::hop::{ChainError, ChunkStream, HopClient};
use crate::ports::resolver::{ServiceInstance, ServiceResolver, TRANSFORMER_TAG};
use crate::ports::storage::{ObjectReader, ObjectStore};
use bytes::Bytes;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Chunks buffered between a hop's subprocess and its caller.
pub const PIPELINE_DEPTH: usize = 4;

const STDERR_TAIL: usize = 4096;

type ChunkSender = mpsc::Sender<Result<Bytes, ChainError>>;

enum Source {
    Object(ObjectReader),
    Hop(ChunkStream),
}

pub struct TransformChain {
    storage: Arc<dyn ObjectStore>,
    resolver: Arc<dyn ServiceResolver>,
    hops: Arc<dyn HopClient>,
    command: Arc<dyn TransformCommand>,
}

impl TransformChain {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        resolver: Arc<dyn ServiceResolver>,
        hops: Arc<dyn HopClient>,
        command: Arc<dyn TransformCommand>,
    ) -> Self {
        Self {
            storage,
            resolver,
            hops,
            command,
        }
    }

    pub fn name(&self) -> &str {
        self.command.name()
    }

    /// Serve one hop of `request`.
    ///
    /// Returns once the source is open; transformed chunks are produced in the
    /// background until the stream is drained or dropped.
    pub async fn transform(&self, request: TransformRequest) -> Result<ChunkStream, ChainError> {
        let (own, next) = request
            .pop()
            .ok_or_else(|| ChainError::InvalidRoute("empty transformer list".to_string()))?;
        if own != self.name() {
            return Err(ChainError::InvalidRoute(format!(
                "{} received a request addressed to {}",
                self.name(),
                own
            )));
        }

        let source = if next.is_origin() {
            debug!(hop = self.name(), path = %next.video_path, "origin hop, reading from storage");
            Source::Object(self.storage.open(&next.video_path).await?)
        } else {
            let instance = first_instance(self.resolver.as_ref(), &next).await?;
            debug!(
                hop = self.name(),
                next = %instance.name,
                endpoint = %instance.endpoint(),
                "forwarding"
            );
            Source::Hop(self.hops.transform(&instance, next).await?)
        };

        let (tx, rx) = mpsc::channel(PIPELINE_DEPTH);
        tokio::spawn(run_hop(self.name().to_string(), self.command.command(), source, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Start a chain: call the hop named last in `transformers` with the full list.
pub async fn request_chain(
    resolver: &dyn ServiceResolver,
    hops: &dyn HopClient,
    video_path: &str,
    transformers: Vec<String>,
) -> Result<ChunkStream, ChainError> {
    let request = TransformRequest::new(video_path, transformers);
    if request.is_origin() {
        return Err(ChainError::InvalidRoute("empty transformer list".to_string()));
    }
    let instance = first_instance(resolver, &request).await?;
    info!(first = %instance.name, hops = request.transformers.len(), "requesting transformation");
    hops.transform(&instance, request).await
}

async fn first_instance(
    resolver: &dyn ServiceResolver,
    request: &TransformRequest,
) -> Result<ServiceInstance, ChainError> {
    let name = request
        .next_hop()
        .ok_or_else(|| ChainError::InvalidRoute("empty transformer list".to_string()))?;
    resolver
        .resolve(name, TRANSFORMER_TAG)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ChainError::NoInstance(name.to_string()))
}

async fn run_hop(hop: String, command: CommandLine, source: Source, tx: ChunkSender) {
    let result = tokio::select! {
        result = pipe_through(&command, source, &tx) => result,
        _ = tx.closed() => {
            // Dropping the pipeline kills the subprocess and the downstream call.
            info!(hop = %hop, "caller went away, cancelling");
            return;
        }
    };

    match result {
        Ok(sent) => debug!(hop = %hop, bytes = sent, "hop finished"),
        Err(e) => {
            warn!(hop = %hop, error = %e, "hop failed");
            let _ = tx.send(Err(e)).await;
        }
    }
}

async fn pipe_through(
    command: &CommandLine,
    source: Source,
    tx: &ChunkSender,
) -> Result<u64, ChainError> {
    let mut child = command
        .to_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ChainError::Transform(format!("cannot start {}: {}", command.program, e))
        })?;

    let missing = |pipe: &str| ChainError::Transform(format!("{} has no {}", command.program, pipe));
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    let feed = async {
        let fed = match source {
            Source::Object(reader) => drain_to_writer(reader, stdin, CHUNK_SIZE)
                .await
                .map_err(ChainError::from),
            Source::Hop(stream) => pump_stream_to_writer(stream, stdin).await,
        };
        match fed {
            // The tool quit reading; its exit status decides the outcome.
            Err(ChainError::Io(e)) if e.kind() == ErrorKind::BrokenPipe => {
                debug!(program = %command.program, "input closed early");
                Ok(())
            }
            fed => fed.map(|_| ()),
        }
    };
    let emit = async { Ok::<_, ChainError>(pump_reader_to_stream(stdout, CHUNK_SIZE, tx).await?) };
    let diagnostics = async { Ok::<_, ChainError>(stderr_tail(stderr).await?) };

    let ((), sent, stderr) = tokio::try_join!(feed, emit, diagnostics)?;

    let status = child.wait().await?;
    if !status.success() {
        return Err(ChainError::Transform(format!(
            "{} exited with {}: {}",
            command.program,
            status,
            stderr.trim()
        )));
    }
    Ok(sent)
}

/// Drain `reader`, keeping only the last few kilobytes.
async fn stderr_tail<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut tail = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        tail.extend_from_slice(&buf[..read]);
        if tail.len() > STDERR_TAIL {
            tail.drain(..tail.len() - STDERR_TAIL);
        }
    }
    Ok(String::from_utf8_lossy(&tail).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::{FsAdapter, StaticResolver};
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock;

    /// Appends `+<marker>` to every line.
    struct Marker {
        name: String,
        marker: String,
        runs: Arc<AtomicUsize>,
    }

    impl TransformCommand for Marker {
        fn name(&self) -> &str {
            &self.name
        }

        fn command(&self) -> CommandLine {
            self.runs.fetch_add(1, Ordering::SeqCst);
            CommandLine::new("sed").args(["-e".to_string(), format!("s/$/+{}/", self.marker)])
        }
    }

    struct Failing;

    impl TransformCommand for Failing {
        fn name(&self) -> &str {
            "broken"
        }

        fn command(&self) -> CommandLine {
            CommandLine::new("sh").args(["-c", "cat > /dev/null; echo boom >&2; exit 3"])
        }
    }

    /// Quits without reading its input, like ffmpeg rejecting a corrupt segment.
    struct Rejecting;

    impl TransformCommand for Rejecting {
        fn name(&self) -> &str {
            "strict"
        }

        fn command(&self) -> CommandLine {
            CommandLine::new("sh").args(["-c", "echo 'Invalid data found' >&2; exit 1"])
        }
    }

    /// Routes hop calls to chains living in the same process.
    #[derive(Default)]
    struct InProcessHops {
        chains: RwLock<HashMap<String, Arc<TransformChain>>>,
    }

    #[async_trait]
    impl HopClient for InProcessHops {
        async fn transform(
            &self,
            instance: &ServiceInstance,
            request: TransformRequest,
        ) -> Result<ChunkStream, ChainError> {
            let chain = self
                .chains
                .read()
                .unwrap()
                .get(&instance.name)
                .cloned()
                .ok_or_else(|| ChainError::Unreachable {
                    name: instance.name.clone(),
                    reason: "not running".to_string(),
                })?;
            chain.transform(request).await
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        storage: Arc<FsAdapter>,
        resolver: Arc<StaticResolver>,
        hops: Arc<InProcessHops>,
        runs: Arc<AtomicUsize>,
    }

    impl Fixture {
        async fn new(segment: &[u8]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            tokio::fs::create_dir_all(dir.path().join("v1/v0")).await.unwrap();
            tokio::fs::write(dir.path().join("v1/v0/segment0.ts"), segment)
                .await
                .unwrap();
            Self {
                storage: Arc::new(FsAdapter::new(dir.path())),
                _dir: dir,
                resolver: Arc::new(StaticResolver::default()),
                hops: Arc::new(InProcessHops::default()),
                runs: Arc::new(AtomicUsize::new(0)),
            }
        }

        async fn start(&self, command: Arc<dyn TransformCommand>) -> Arc<TransformChain> {
            let chain = Arc::new(TransformChain::new(
                self.storage.clone(),
                self.resolver.clone(),
                self.hops.clone(),
                command,
            ));
            let name = chain.name().to_string();
            self.resolver
                .register(
                    &ServiceInstance::new(&name, "127.0.0.1", 0),
                    &[TRANSFORMER_TAG.to_string()],
                )
                .await
                .unwrap();
            self.hops.chains.write().unwrap().insert(name, chain.clone());
            chain
        }

        async fn start_marker(&self, name: &str, marker: &str) -> Arc<TransformChain> {
            self.start(Arc::new(Marker {
                name: name.to_string(),
                marker: marker.to_string(),
                runs: self.runs.clone(),
            }))
            .await
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    async fn collect(stream: ChunkStream) -> Result<Vec<u8>, ChainError> {
        let chunks: Vec<Bytes> = stream.try_collect().await?;
        Ok(chunks.concat())
    }

    #[tokio::test]
    async fn test_single_hop_reads_from_storage() {
        let fixture = Fixture::new(b"x\n").await;
        let flip = fixture.start_marker("flip", "F").await;

        let stream = flip
            .transform(TransformRequest::new("v1/v0/segment0.ts", names(&["flip"])))
            .await
            .unwrap();

        assert_eq!(collect(stream).await.unwrap(), b"x+F\n");
        assert_eq!(fixture.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_applies_every_hop_once_in_order() {
        let fixture = Fixture::new(b"x\n").await;
        fixture.start_marker("a", "A").await;
        fixture.start_marker("b", "B").await;
        fixture.start_marker("c", "C").await;

        let stream = request_chain(
            fixture.resolver.as_ref(),
            fixture.hops.as_ref(),
            "v1/v0/segment0.ts",
            names(&["a", "b", "c"]),
        )
        .await
        .unwrap();

        // The head of the list is the origin, so its effect is applied first.
        assert_eq!(collect(stream).await.unwrap(), b"x+A+B+C\n");
        assert_eq!(fixture.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_large_segment_is_streamed_through() {
        let line = "0123456789".repeat(10);
        let segment = format!("{}\n", line).repeat(2_000);
        let fixture = Fixture::new(segment.as_bytes()).await;
        fixture.start_marker("a", "A").await;
        fixture.start_marker("b", "B").await;

        let stream = request_chain(
            fixture.resolver.as_ref(),
            fixture.hops.as_ref(),
            "v1/v0/segment0.ts",
            names(&["a", "b"]),
        )
        .await
        .unwrap();

        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert!(chunks.iter().all(|c| c.len() <= CHUNK_SIZE));
        let expected = format!("{}+A+B\n", line).repeat(2_000);
        assert_eq!(chunks.concat(), expected.as_bytes());
    }

    #[tokio::test]
    async fn test_route_must_end_with_own_name() {
        let fixture = Fixture::new(b"x\n").await;
        let flip = fixture.start_marker("flip", "F").await;

        let err = flip
            .transform(TransformRequest::new("v1/v0/segment0.ts", names(&["flip", "gray"])))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::InvalidRoute(_)));

        let err = flip
            .transform(TransformRequest::new("v1/v0/segment0.ts", vec![]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::InvalidRoute(_)));
        assert_eq!(fixture.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_next_hop() {
        let fixture = Fixture::new(b"x\n").await;
        let flip = fixture.start_marker("flip", "F").await;

        let err = flip
            .transform(TransformRequest::new("v1/v0/segment0.ts", names(&["sepia", "flip"])))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::NoInstance(ref name) if name == "sepia"));
    }

    #[tokio::test]
    async fn test_missing_segment() {
        let fixture = Fixture::new(b"x\n").await;
        let flip = fixture.start_marker("flip", "F").await;

        let err = flip
            .transform(TransformRequest::new("v1/v0/segment9.ts", names(&["flip"])))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::Storage(_)));
    }

    #[tokio::test]
    async fn test_failing_subprocess_ends_stream_with_error() {
        let fixture = Fixture::new(b"x\n").await;
        fixture.start(Arc::new(Failing)).await;
        fixture.start_marker("flip", "F").await;

        let stream = request_chain(
            fixture.resolver.as_ref(),
            fixture.hops.as_ref(),
            "v1/v0/segment0.ts",
            names(&["broken", "flip"]),
        )
        .await
        .unwrap();

        match collect(stream).await {
            Err(ChainError::Transform(message)) => assert!(message.contains("boom"), "{}", message),
            other => panic!("expected a transform error, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_early_exit_keeps_tool_diagnostics() {
        let segment = vec![b'x'; 4 * 1024 * 1024];
        let fixture = Fixture::new(&segment).await;
        let strict = fixture.start(Arc::new(Rejecting)).await;

        let stream = strict
            .transform(TransformRequest::new("v1/v0/segment0.ts", names(&["strict"])))
            .await
            .unwrap();

        match collect(stream).await {
            Err(ChainError::Transform(message)) => {
                assert!(message.contains("Invalid data found"), "{}", message);
                assert!(message.contains("exit status: 1"), "{}", message);
            }
            other => panic!("expected a transform error, got {:?}", other.map(|b| b.len())),
        }
    }
}
