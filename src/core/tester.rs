use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::path::Path;

use crate::render::{GridDescriptor, SMOKE_TEST};
use crate::tools::{args, ToolRunner};

/// Result of a smoke test run
pub struct TestResult {
    pub success: bool,
    pub message: Option<String>,
}

/// Run the generated smoke test against the grid. Defaults to the public
/// URL recorded at install time.
pub async fn run_smoke_test(
    runner: &dyn ToolRunner,
    install_dir: &Path,
    grid_url: Option<&str>,
) -> Result<TestResult> {
    let descriptor = GridDescriptor::load(install_dir)?;
    let script = install_dir.join(SMOKE_TEST);
    if !script.exists() {
        return Err(anyhow!("Smoke test not found: {}", script.display()));
    }

    if !runner.exists("python3").await {
        return Err(anyhow!(
            "python3 is required for the smoke test (with the selenium package: pip install selenium)"
        ));
    }

    let url = grid_url.unwrap_or(&descriptor.public_url);
    info!("Running smoke test against {}", url);

    let output = runner
        .run(
            "python3",
            &args([script.to_string_lossy().into_owned(), url.to_string()]),
        )
        .await
        .context("Failed to run smoke test")?;

    debug!("Smoke test stdout:\n{}", output.stdout);

    let mut report = output.stdout.trim().to_string();
    if !output.success && !output.stderr.trim().is_empty() {
        if !report.is_empty() {
            report.push('\n');
        }
        report.push_str(output.stderr.trim());
    }

    Ok(TestResult {
        success: output.success,
        message: (!report.is_empty()).then_some(report),
    })
}
