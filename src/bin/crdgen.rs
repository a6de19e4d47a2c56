// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates the `Network` CRD from the Rust type in src/crd.rs so that
//! deploy/crds/ stays in sync with the code.
//!
//! Usage:
//!   cargo run --bin crdgen

use kube::CustomResourceExt;
use std::fs;
use std::path::Path;
use tenant_network_controller::crd::Network;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = Path::new("deploy/crds");
    fs::create_dir_all(output_dir)?;

    let yaml = serde_yaml::to_string(&Network::crd())?;
    let output_path = output_dir.join("networks.crd.yaml");
    fs::write(&output_path, format!("{COPYRIGHT_HEADER}{yaml}"))?;

    println!("✓ Generated {}", output_path.display());
    Ok(())
}
