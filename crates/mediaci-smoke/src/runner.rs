//! Smoke case execution.

use crate::case::{Feature, SmokeCase, SmokeSuite};
use crate::compare::{
    Reference, Verdict, compare_md5, compare_psnr, md5_file, parse_psnr, parse_stream_resolution,
    same_contents,
};
use mediaci_core::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Two files whose PSNR is measured, and their frame size if known.
#[derive(Debug)]
struct PsnrPair {
    reference: PathBuf,
    compared: PathBuf,
    resolution: Option<(u32, u32)>,
}

/// Outcome of one smoke case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub id: String,
    pub feature: Feature,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SmokeSummary {
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl SmokeSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs smoke cases from `root_dir`, where their relative paths resolve.
#[derive(Debug, Clone)]
pub struct SmokeRunner {
    root_dir: PathBuf,
    metrics_command: Vec<String>,
    ffmpeg_command: Vec<String>,
}

impl SmokeRunner {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            metrics_command: vec!["metrics_calc_lite".to_string()],
            ffmpeg_command: vec!["ffmpeg".to_string()],
        }
    }

    /// Replace the decoder that turns encoded outputs back into raw frames.
    pub fn with_ffmpeg_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ffmpeg_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the PSNR tool. Its arguments are appended after these.
    pub fn with_metrics_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics_command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub async fn run_suite(&self, suite: &SmokeSuite) -> SmokeSummary {
        let mut summary = SmokeSummary::default();
        for case in &suite.cases {
            let result = self.run_case(case).await;
            if result.verdict.passed() {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            summary.results.push(result);
        }
        info!(
            passed = summary.passed,
            failed = summary.failed,
            "Smoke suite finished"
        );
        summary
    }

    pub async fn run_case(&self, case: &SmokeCase) -> CaseResult {
        let start = Instant::now();
        let verdict = match self.verify(case).await {
            Ok(verdict) => verdict,
            Err(e) => Verdict::Failed(e.to_string()),
        };
        match &verdict {
            Verdict::Passed => info!(case = %case.id, "Smoke case passed"),
            Verdict::Failed(reason) => warn!(case = %case.id, reason = %reason, "Smoke case failed"),
        }
        CaseResult {
            id: case.id.clone(),
            feature: case.feature,
            verdict,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn verify(&self, case: &SmokeCase) -> Result<Verdict> {
        let reference = case.reference()?;

        if let Some(output) = case.output_file() {
            let output = self.root_dir.join(output);
            match tokio::fs::remove_file(&output).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
            if let Some(parent) = output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let run = self.run(&case.cmd).await?;
        if !run.status.success() {
            return Ok(Verdict::Failed(format!("command exited with {}", run.status)));
        }

        let Some(reference) = reference else {
            return Ok(Verdict::Passed);
        };
        let output = case.output_file().ok_or_else(|| {
            Error::InvalidSpecification(format!("{}: command has no -y output file", case.id))
        })?;

        match reference {
            Reference::Md5(expected) => {
                let actual = md5_file(&self.root_dir.join(output)).await?;
                Ok(compare_md5(&expected, &actual))
            }
            Reference::Psnr(expected) => {
                let Some(pair) = self.psnr_pair(case, output).await? else {
                    info!(case = %case.id, "No software reference, PSNR not measured");
                    return Ok(Verdict::Passed);
                };
                let reference = self.root_dir.join(&pair.reference);
                let compared = self.root_dir.join(&pair.compared);
                if same_contents(&reference, &compared).await? {
                    info!(case = %case.id, "Output matches the software reference byte for byte");
                    return Ok(Verdict::Passed);
                }
                let actual = self.measure_psnr(case, &pair).await?;
                info!(case = %case.id, reference = expected, actual, "PSNR measured");
                Ok(compare_psnr(expected, actual))
            }
        }
    }

    /// Find or produce the files a PSNR check compares.
    async fn psnr_pair(&self, case: &SmokeCase, output: &Path) -> Result<Option<PsnrPair>> {
        if let Some(compare_with) = &case.compare_with {
            return Ok(Some(PsnrPair {
                reference: compare_with.clone(),
                compared: output.to_path_buf(),
                resolution: case.resolution(),
            }));
        }

        let Some(software) = case.software_reference(&self.ffmpeg_command)? else {
            return Ok(None);
        };
        debug!(case = %case.id, command = %software.command.join(" "), "Producing software reference");
        let run = self.run(&software.command).await?;
        if !run.status.success() {
            return Err(Error::Execution(format!(
                "software reference exited with {}",
                run.status
            )));
        }

        let log = format!(
            "{}{}",
            String::from_utf8_lossy(&run.stdout),
            String::from_utf8_lossy(&run.stderr)
        );
        Ok(Some(PsnrPair {
            reference: software.reference,
            compared: software.compared,
            resolution: software
                .resolution
                .or_else(|| parse_stream_resolution(&log))
                .or_else(|| case.resolution()),
        }))
    }

    async fn measure_psnr(&self, case: &SmokeCase, pair: &PsnrPair) -> Result<f64> {
        let (width, height) = pair.resolution.ok_or_else(|| {
            Error::InvalidSpecification(format!("{}: psnr case needs a resolution", case.id))
        })?;
        let mut args = self.metrics_command.clone();
        args.extend([
            "-i1".to_string(),
            pair.reference.display().to_string(),
            "-i2".to_string(),
            pair.compared.display().to_string(),
            "-w".to_string(),
            width.to_string(),
            "-h".to_string(),
            height.to_string(),
            "psnr".to_string(),
            "ssim".to_string(),
            "all".to_string(),
        ]);

        let run = self.run(&args).await?;
        if !run.status.success() {
            return Err(Error::Execution(format!(
                "metrics tool exited with {}",
                run.status
            )));
        }
        parse_psnr(&String::from_utf8_lossy(&run.stdout))
    }

    async fn run(&self, args: &[String]) -> Result<Output> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| Error::InvalidSpecification("empty command".to_string()))?;
        Command::new(program)
            .args(rest)
            .current_dir(&self.root_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Execution(format!("Failed to spawn {}: {}", program, e)))
    }
}
