fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(false)
        .compile_protos(
            &["proto/bfruntime.proto", "proto/google/rpc/status.proto"],
            &["proto/"],
        )?;
    Ok(())
}
