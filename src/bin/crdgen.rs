// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates Kubernetes CRD YAML files from the Rust types in src/crd.rs,
//! so the manifests in deploy/crds/ are always in sync with the code.
//!
//! Usage:
//!   cargo run --bin crdgen

use kube::CustomResourceExt;
use rampart::crd::{
    GlobalConfiguration, Policy, ProtectedResource, TransportServer, VirtualServer,
    VirtualServerRoute,
};
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 The Rampart Authors
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = Path::new("deploy/crds");
    fs::create_dir_all(output_dir)?;

    println!("Generating CRD YAML files from src/crd.rs...");

    generate_crd::<VirtualServer>("virtualservers.crd.yaml", output_dir)?;
    generate_crd::<VirtualServerRoute>("virtualserverroutes.crd.yaml", output_dir)?;
    generate_crd::<TransportServer>("transportservers.crd.yaml", output_dir)?;
    generate_crd::<Policy>("policies.crd.yaml", output_dir)?;
    generate_crd::<GlobalConfiguration>("globalconfigurations.crd.yaml", output_dir)?;
    generate_crd::<ProtectedResource>("protectedresources.crd.yaml", output_dir)?;

    println!("Generated CRD YAML files in deploy/crds/");
    println!("Deploy with: kubectl apply -f deploy/crds/");

    Ok(())
}

fn generate_crd<T>(filename: &str, output_dir: &Path) -> Result<(), Box<dyn std::error::Error>>
where
    T: CustomResourceExt,
{
    let yaml = serde_yaml::to_string(&T::crd())?;
    let content = format!("{COPYRIGHT_HEADER}{yaml}");
    fs::write(output_dir.join(filename), content)?;
    println!("  Generated {filename}");
    Ok(())
}
