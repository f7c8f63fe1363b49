use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let proto_root = PathBuf::from("../proto");

    // Tell cargo to recompile if any proto files change
    println!("cargo:rerun-if-changed=../proto/gridmesh/auth/v1/");
    println!("cargo:rerun-if-changed=../proto/gridmesh/relation/v1/");

    tonic_build::configure()
        .build_server(true)
        // The relation engine is consumed as a client.
        .build_client(true)
        .file_descriptor_set_path(
            PathBuf::from(std::env::var("OUT_DIR")?).join("auth_service_descriptor.bin"),
        )
        .compile_protos(
            &[
                "../proto/gridmesh/auth/v1/auth.proto",
                "../proto/gridmesh/relation/v1/relation.proto",
            ],
            &[proto_root],
        )?;

    Ok(())
}
