fn main() {
    // No system protoc is available in this build environment; point prost at
    // the vendored binary so codegen can run.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc);
        }
    }

    let mut config = prost_build::Config::new();
    // deterministic option iteration; descriptors are cache keys
    config.btree_map(&[".tessera.v1.ProviderDefinition.options"]);

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_with_config(
            config,
            &[
                "proto/tessera/v1/types.proto",
                "proto/tessera/v1/schema.proto",
                "proto/tessera/v1/query.proto",
                "proto/tessera/v1/service.proto",
            ],
            &["proto"],
        )
        .unwrap();
}
