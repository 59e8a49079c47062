use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cli::DoctorArgs;
use polybuild::adapter::ToolchainStatus;
use polybuild::builder::{Builder, ParallelInfo};
use polybuild::config::BuilderConfig;

#[derive(Serialize)]
struct DoctorReport {
    toolchains: BTreeMap<String, ToolchainStatus>,
    parallel: ParallelInfo,
}

/// Probe every registered toolchain. Returns whether all are available.
pub async fn run(config: BuilderConfig, args: DoctorArgs) -> Result<bool> {
    let environment = config.environment_path();
    let (report, cache_root) = tokio::task::spawn_blocking(move || {
        let builder = Builder::new(config);
        let report = DoctorReport {
            toolchains: builder.probe_toolchains(),
            parallel: builder.parallel_info(),
        };
        (report, builder.cache().root().to_path_buf())
    })
    .await
    .context("Toolchain probe failed")?;

    let all_ok = report.toolchains.values().all(|s| s.available);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize probes")?
        );
        return Ok(all_ok);
    }

    println!("polybuild doctor - toolchain check\n");

    for (label, status) in &report.toolchains {
        let mark = if status.available { "✅" } else { "❌" };
        println!("{} {:<24} {}", mark, label, status.detail);
    }

    let parallel = report.parallel;
    println!();
    println!(
        "Parallel builds: {}",
        if parallel.enabled { "enabled" } else { "disabled" }
    );
    println!("Max workers: {}", parallel.max_workers);
    println!("CPU count: {}", parallel.cpu_count);

    println!();
    println!("Cache directory: {}", cache_root.display());
    match environment {
        Some(env) => println!("Python environment: {}", env.display()),
        None => println!("Python environment: (system interpreter)"),
    }

    println!();
    if all_ok {
        println!("All toolchains available.");
    } else {
        println!("Some toolchains are unavailable; groups in those languages will fail.");
    }

    Ok(all_ok)
}
