use std::io::Result;

fn main() -> Result<()> {
    // Control services exposed by the V2Ray API. Their imports are pulled in by protox.
    let proto_files = &[
        "proto/app/stats/command/command.proto",
        "proto/app/log/command/config.proto",
        "proto/app/proxyman/command/command.proto",
        "proto/testing/stream.proto",
    ];

    // Name of the folder containing the proto definitions
    let proto_folder = "proto";

    println!("cargo:rerun-if-changed={proto_folder}");

    let file_descriptors = protox::compile(proto_files, [proto_folder]).unwrap();

    tonic_prost_build::configure()
        .build_client(false)
        .include_file("v2ray.rs")
        .compile_fds(file_descriptors)?;

    Ok(())
}
