//! Smoke case definitions.

use crate::compare::Reference;
use mediaci_core::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hardware selection flags dropped, with their values, for software runs.
const HARDWARE_FLAGS: [&str; 3] = ["-hwaccel", "-hwaccel_device", "-vaapi_device"];
const SCALE_VAAPI_PATTERN: &str = r"scale_vaapi=w=(\d+):h=(\d+)";

/// How to produce the software output a hardware output is measured against.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareReference {
    pub command: Vec<String>,
    /// First metrics input.
    pub reference: PathBuf,
    /// Second metrics input.
    pub compared: PathBuf,
    /// Frame size, when known before the software run.
    pub resolution: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Decode,
    Encode,
    /// Video processing, e.g. scaling.
    Vp,
    /// Only checks that the command runs.
    Playback,
}

/// One smoke case: a transcoding command and the reference its output is
/// checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeCase {
    pub id: String,
    pub feature: Feature,
    /// Program and arguments. The output file follows `-y`.
    pub cmd: Vec<String>,
    #[serde(default)]
    pub ref_type: Option<String>,
    #[serde(default)]
    pub ref_value: Option<String>,
    /// Precomputed software output to measure PSNR against. When unset the
    /// software reference is produced from the command itself.
    #[serde(default)]
    pub compare_with: Option<PathBuf>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl SmokeCase {
    /// The reference to verify against. `None` for playback cases without one.
    pub fn reference(&self) -> Result<Option<Reference>> {
        match (&self.ref_type, &self.ref_value) {
            (Some(ref_type), Some(ref_value)) => Reference::parse(ref_type, ref_value).map(Some),
            (None, None) if self.feature == Feature::Playback => Ok(None),
            (Some(ref_type), None) => Err(Error::InvalidReference(format!(
                "{}: {} reference has no value",
                self.id, ref_type
            ))),
            _ => Err(Error::InvalidReference(format!(
                "{}: only support md5 and psnr",
                self.id
            ))),
        }
    }

    fn arg_after(&self, flag: &str) -> Option<&str> {
        let idx = self.cmd.iter().position(|a| a == flag)?;
        self.cmd.get(idx + 1).map(String::as_str)
    }

    /// Output file written by the command.
    pub fn output_file(&self) -> Option<&Path> {
        if self.feature == Feature::Playback {
            return None;
        }
        self.arg_after("-y").map(Path::new)
    }

    pub fn input_file(&self) -> Option<&Path> {
        self.arg_after("-i").map(Path::new)
    }

    /// The case command without hardware selection flags, writing to `output`.
    fn software_command(&self, output: &Path) -> Vec<String> {
        let mut command = Vec::with_capacity(self.cmd.len());
        let mut args = self.cmd.iter();
        while let Some(arg) = args.next() {
            if HARDWARE_FLAGS.contains(&arg.as_str()) {
                args.next();
                continue;
            }
            command.push(arg.clone());
            if arg == "-y" && args.next().is_some() {
                command.push(output.display().to_string());
            }
        }
        command
    }

    /// Plan the software run for a PSNR check.
    ///
    /// Decode cases repeat the decode without hardware acceleration, encode
    /// cases decode the output back to raw frames with `ffmpeg` and compare
    /// them with the input, and vp cases redo a `scale_vaapi` in software.
    /// `None` when the case has nothing to measure.
    pub fn software_reference(&self, ffmpeg: &[String]) -> Result<Option<SoftwareReference>> {
        let Some(output) = self.output_file() else {
            return Ok(None);
        };
        let sibling = |suffix: &str| {
            let mut name = output.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };

        match self.feature {
            Feature::Playback => Ok(None),
            Feature::Decode => {
                let sw_output = sibling("_sw.yuv");
                Ok(Some(SoftwareReference {
                    command: self.software_command(&sw_output),
                    reference: sw_output,
                    compared: output.to_path_buf(),
                    resolution: None,
                }))
            }
            Feature::Encode => {
                let input = self.input_file().ok_or_else(|| {
                    Error::InvalidSpecification(format!("{}: encode case has no -i input file", self.id))
                })?;
                let decoded = sibling(".yuv");
                let mut command = ffmpeg.to_vec();
                command.extend(
                    ["-v", "debug", "-i"]
                        .into_iter()
                        .map(String::from)
                        .chain([output.display().to_string()])
                        .chain(
                            ["-pix_fmt", "yuv420p", "-f", "rawvideo", "-vsync", "passthrough"]
                                .into_iter()
                                .map(String::from),
                        ),
                );
                if let Some(frames) = self.arg_after("-vframes") {
                    command.extend(["-vframes".to_string(), frames.to_string()]);
                }
                command.extend(["-y".to_string(), decoded.display().to_string()]);
                Ok(Some(SoftwareReference {
                    command,
                    reference: input.to_path_buf(),
                    compared: decoded,
                    resolution: self.resolution(),
                }))
            }
            Feature::Vp => {
                let Some((width, height)) = self.vaapi_scale() else {
                    return Ok(None);
                };
                let sw_output = sibling("_sw.yuv");
                let mut command = self.software_command(&sw_output);
                if let Some(idx) = command.iter().position(|a| a == "-vf")
                    && let Some(filter) = command.get_mut(idx + 1)
                {
                    *filter = format!("scale={}:{}", width, height);
                }
                Ok(Some(SoftwareReference {
                    command,
                    reference: sw_output,
                    compared: output.to_path_buf(),
                    resolution: Some((width, height)),
                }))
            }
        }
    }

    /// Target size of a `scale_vaapi` filter in the command's `-vf`.
    fn vaapi_scale(&self) -> Option<(u32, u32)> {
        let filter = self.arg_after("-vf")?;
        let re = Regex::new(SCALE_VAAPI_PATTERN).ok()?;
        let captures = re.captures(filter)?;
        Some((captures[1].parse().ok()?, captures[2].parse().ok()?))
    }

    /// Frame size, from `width`/`height` or the command's `-s:v WxH`.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        if let (Some(w), Some(h)) = (self.width, self.height) {
            return Some((w, h));
        }
        let (w, h) = self.arg_after("-s:v")?.split_once('x')?;
        Some((w.parse().ok()?, h.parse().ok()?))
    }
}

/// An ordered list of smoke cases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SmokeSuite {
    pub cases: Vec<SmokeCase>,
}

impl SmokeSuite {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let suite: SmokeSuite = serde_yaml::from_str(contents)?;
        let mut seen = std::collections::HashSet::new();
        for case in &suite.cases {
            if !seen.insert(case.id.as_str()) {
                return Err(Error::AmbiguousName(case.id.clone()));
            }
            if case.cmd.is_empty() {
                return Err(Error::InvalidSpecification(format!(
                    "{}: empty command",
                    case.id
                )));
            }
        }
        Ok(suite)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
