//! Compiles the protobuf contracts shared by the encoder and the transformer chain.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    let protos = ["proto/video.proto", "proto/transformer.proto"];
    for proto in protos {
        println!("cargo:rerun-if-changed={}", proto);
    }
    println!("cargo:rerun-if-changed=proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .bytes(["."])
        .compile_protos(&protos, &["proto"])?;

    Ok(())
}
