//! Generate updated proto code for the instance control client.
//!
//! This is setup as an example instead of as part of a build.rs so that building the controller
//! does not require `protoc`.

use anyhow::{Context, Result};

fn main() -> Result<()> {
    tonic_build::configure()
        .out_dir("src/grpc")
        .build_client(true)
        .build_server(false)
        .compile(&["proto/instance.proto"], &["proto"])
        .context("error compiling instance proto")?;

    Ok(())
}
