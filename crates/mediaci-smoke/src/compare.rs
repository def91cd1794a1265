//! Reference parsing and output comparison.

use mediaci_core::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Largest relative PSNR drop, in percent, that still passes.
pub const MAX_PSNR_DROP_PERCENT: f64 = 5.0;

/// Expected property of a case's output.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// Lowercase hex digest of the output file.
    Md5(String),
    Psnr(f64),
}

impl Reference {
    /// Parse a `(ref_type, ref_value)` pair. `ref_type` is case-insensitive.
    pub fn parse(ref_type: &str, ref_value: &str) -> Result<Self> {
        match ref_type.to_ascii_lowercase().as_str() {
            "md5" => Ok(Reference::Md5(ref_value.trim().to_ascii_lowercase())),
            "psnr" => {
                let value: f64 = ref_value.trim().parse().map_err(|_| {
                    Error::InvalidReference(format!("psnr reference is not a number: {}", ref_value))
                })?;
                if value <= 0.0 {
                    return Err(Error::InvalidReference(format!(
                        "psnr reference must be positive: {}",
                        ref_value
                    )));
                }
                Ok(Reference::Psnr(value))
            }
            other => Err(Error::InvalidReference(format!(
                "{}: only support md5 and psnr",
                other
            ))),
        }
    }
}

/// Outcome of one verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed(String),
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

const PSNR_PATTERN: &str = r"<avg_metric=PSNR>(.*?)</avg_metric>";

/// Extract the average PSNR from metrics tool output.
pub fn parse_psnr(output: &str) -> Result<f64> {
    let re = Regex::new(PSNR_PATTERN).map_err(|e| Error::Internal(e.to_string()))?;
    let captured = re
        .captures(output)
        .and_then(|c| c.get(1))
        .ok_or_else(|| Error::Execution("no average PSNR in metrics output".to_string()))?;
    captured
        .as_str()
        .trim()
        .parse()
        .map_err(|_| Error::Execution(format!("invalid PSNR value: {}", captured.as_str())))
}

/// Relative PSNR change in percent, rounded to four decimals.
pub fn psnr_gap(actual: f64, reference: f64) -> f64 {
    let gap = 100.0 * (actual - reference) / reference;
    (gap * 10_000.0).round() / 10_000.0
}

pub fn compare_psnr(reference: f64, actual: f64) -> Verdict {
    let gap = psnr_gap(actual, reference);
    if gap < -MAX_PSNR_DROP_PERCENT {
        Verdict::Failed(format!(
            "psnr {} is {}% off reference {}",
            actual, gap, reference
        ))
    } else {
        Verdict::Passed
    }
}

pub fn compare_md5(expected: &str, actual: &str) -> Verdict {
    if expected == actual {
        Verdict::Passed
    } else {
        Verdict::Failed(format!("md5 {} does not match reference {}", actual, expected))
    }
}

const STREAM_PATTERN: &str = r"Stream #.*, (\d+)x(\d+)";

/// Frame size of the first video stream in ffmpeg's log.
pub fn parse_stream_resolution(log: &str) -> Option<(u32, u32)> {
    let re = Regex::new(STREAM_PATTERN).ok()?;
    let captures = re.captures(log)?;
    Some((captures[1].parse().ok()?, captures[2].parse().ok()?))
}

/// Whether two files hold the same bytes.
pub async fn same_contents(first: &Path, second: &Path) -> Result<bool> {
    let (a, b) = (tokio::fs::metadata(first).await?, tokio::fs::metadata(second).await?);
    if a.len() != b.len() {
        return Ok(false);
    }
    Ok(md5_file(first).await? == md5_file(second).await?)
}

/// Lowercase hex MD5 digest of a file.
pub async fn md5_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}
