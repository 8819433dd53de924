use std::process::Command;

use anyhow::{Context, Result};

/// Feature sets checked with `--no-default-features`
const FEATURE_COMBINATIONS: &[&[&str]] = &[
    &["foundation"],
    &["observability"],
    &["runtime"],
    &["test-utils"],
    &["foundation", "test-utils"],
];

/// Check that every rampart-common feature tier compiles on its own.
pub fn test_feature_matrix() -> Result<()> {
    println!("Testing {} rampart-common feature combinations...", FEATURE_COMBINATIONS.len());

    for (index, features) in FEATURE_COMBINATIONS.iter().enumerate() {
        let joined = features.join(",");

        println!(
            "\n[{}/{}] cargo check -p rampart-common --no-default-features --features {joined}",
            index + 1,
            FEATURE_COMBINATIONS.len(),
        );

        let status = Command::new("cargo")
            .args(["check", "-p", "rampart-common", "--all-targets", "--no-default-features"])
            .arg("--features")
            .arg(&joined)
            .status()
            .with_context(|| format!("Failed to run cargo check for '{joined}'"))?;

        if !status.success() {
            anyhow::bail!("Feature combination '{joined}' failed to compile");
        }

        println!("✅ Features '{joined}' compiled successfully");
    }

    println!("\n✅ All {} feature combinations compile successfully!", FEATURE_COMBINATIONS.len());

    Ok(())
}
