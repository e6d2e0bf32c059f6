//! Transform Client Binary
//!
//! Requests a chain of transformations on a stored segment and writes the
//! result to a local file.
//!
//! Usage: transform-client <video_path> <output_file> <transformer>...
//!
//! The first transformer is applied first. Hops are located through the
//! resolver configured by RESOLVER, CONSUL_URL or STATIC_SERVICES.

use tracing_subscriber::EnvFilter;
use vidcast::adapters::grpc::client::GrpcHopClient;
use vidcast::adapters::resolver_from_config;
use vidcast::application::chain::request_chain;
use vidcast::application::relay::pump_stream_to_writer;
use vidcast::config::ResolverConfig;
use vidcast::ports::hop::ChainError;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        eprintln!("usage: transform-client <video_path> <output_file> <transformer>...");
        std::process::exit(2);
    }
    let video_path = args[0].clone();
    let output = args[1].clone();
    let transformers = args[2..].to_vec();

    let resolver = match resolver_from_config(&ResolverConfig::from_env()) {
        Ok(resolver) => resolver,
        Err(e) => {
            eprintln!("Failed to build service resolver: {}", e);
            std::process::exit(1);
        }
    };

    let chunks = match request_chain(
        resolver.as_ref(),
        &GrpcHopClient::default(),
        &video_path,
        transformers,
    )
    .await
    {
        Ok(chunks) => chunks,
        Err(e) => {
            eprintln!("Failed to start transformation: {}", e);
            std::process::exit(1);
        }
    };

    let file = match tokio::fs::File::create(&output).await {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to create {}: {}", output, e);
            std::process::exit(1);
        }
    };

    match pump_stream_to_writer::<_, ChainError, _>(chunks, file).await {
        Ok(bytes) => println!("Wrote {} bytes to {}", bytes, output),
        Err(e) => {
            eprintln!("Transformation failed: {}", e);
            std::process::exit(1);
        }
    }
}
