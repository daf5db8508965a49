//! Media processing collaborator.
//!
//! The dispatcher never transforms media itself. It hands a [`ProcessingJob`]
//! to a [`MediaProcessor`], which reads `input`, writes `output` and reports
//! success or failure. [`FfmpegProcessor`] is the production implementation;
//! tests substitute their own.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

use mediaferry_protocol::{Operation, Parameters};

/// Errors reported by a media processor.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// A parameter is missing or outside its accepted values.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The external program could not be started.
    #[error("failed to launch {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The processor ran but reported failure.
    #[error("{operation} failed ({status}): {detail}")]
    Failed {
        operation: Operation,
        status: String,
        detail: String,
    },

    /// The worker running the job went away.
    #[error("processing worker failed: {0}")]
    Worker(String),
}

impl ProcessingError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// One processing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingJob {
    pub operation: Operation,
    pub input: PathBuf,
    pub output: PathBuf,
    pub parameters: Parameters,
}

/// Performs a media transformation from `job.input` to `job.output`.
///
/// Implementations block; callers run them on a worker thread.
pub trait MediaProcessor: Send + Sync + 'static {
    fn process(&self, job: &ProcessingJob) -> Result<(), ProcessingError>;
}

/// Shape of the file an operation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    /// File name stem, e.g. `compressed_video`.
    pub stem: &'static str,
    /// Extension without the dot.
    pub extension: &'static str,
    /// Media type sent back with the file.
    pub media_type: &'static str,
}

const MP4_VIDEO: (&str, &str) = ("mp4", "video/mp4");

impl OutputFormat {
    /// Resolves the output format of `operation`.
    ///
    /// Trim picks its container from the `type` parameter (`gif` unless
    /// given), so an unsupported value is rejected here, before any file
    /// exists.
    pub fn for_operation(
        operation: Operation,
        parameters: &Parameters,
    ) -> Result<Self, ProcessingError> {
        let (stem, (extension, media_type)) = match operation {
            Operation::Compress => ("compressed_video", MP4_VIDEO),
            Operation::Resize => ("resized_video", MP4_VIDEO),
            Operation::Aspect => ("aspect_video", MP4_VIDEO),
            Operation::Convert => ("converted_audio", ("mp3", "audio/mp3")),
            Operation::Trim => ("trimmed_video", trim_container(parameters)?),
        };
        Ok(Self {
            stem,
            extension,
            media_type,
        })
    }

    /// Output file name for a request stamped with `timestamp`.
    pub fn file_name(&self, timestamp: &str) -> String {
        format!("{}_{}.{}", self.stem, timestamp, self.extension)
    }
}

fn trim_container(parameters: &Parameters) -> Result<(&'static str, &'static str), ProcessingError> {
    match parameter(parameters, "type")
        .unwrap_or("gif")
        .to_ascii_lowercase()
        .as_str()
    {
        "gif" => Ok(("gif", "image/gif")),
        "webm" => Ok(("webm", "video/webm")),
        other => Err(ProcessingError::invalid(
            "type",
            format!("unsupported trim format {other:?}, expected gif or webm"),
        )),
    }
}

/// Runs jobs through an ffmpeg subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegProcessor {
    program: PathBuf,
}

impl Default for FfmpegProcessor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegProcessor {
    /// Uses `program` as the ffmpeg executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Builds the ffmpeg command line for `job`, without the program name.
    pub fn arguments(&self, job: &ProcessingJob) -> Result<Vec<OsString>, ProcessingError> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(job.input.clone().into_os_string());

        let params = &job.parameters;
        let codec_args: Vec<String> = match job.operation {
            Operation::Compress => {
                let mut out = strings(&["-vcodec", "libx264", "-crf"]);
                out.push(crf(params)?.to_string());
                out.extend(strings(&["-preset", "medium", "-tune", "film", "-an", "-f", "mp4"]));
                out
            }
            Operation::Resize => {
                let (width, height) = resolution(params)?;
                let mut out = vec!["-vf".to_string(), format!("scale={width}:{height}")];
                out.extend(reencode_h264());
                out
            }
            Operation::Aspect => {
                let filter = aspect_filter(params)?;
                let mut out = vec!["-vf".to_string(), filter];
                out.extend(reencode_h264());
                out
            }
            Operation::Convert => strings(&["-vn", "-acodec", "libmp3lame", "-f", "mp3"]),
            Operation::Trim => {
                let (extension, _) = trim_container(params)?;
                let start = time_value(params, "start_time")?;
                let duration = time_value(params, "duration")?;
                let mut out = vec![
                    "-ss".to_string(),
                    start.to_string(),
                    "-t".to_string(),
                    duration.to_string(),
                ];
                if extension == "gif" {
                    out.extend(strings(&[
                        "-vf",
                        "fps=10,scale=320:-1:flags=lanczos",
                        "-c:v",
                        "gif",
                    ]));
                } else {
                    out.extend(strings(&[
                        "-c:v",
                        "libvpx-vp9",
                        "-crf",
                        "30",
                        "-b:v",
                        "0",
                        "-an",
                    ]));
                }
                out
            }
        };

        args.extend(codec_args.into_iter().map(OsString::from));
        args.push(job.output.clone().into_os_string());
        Ok(args)
    }
}

impl MediaProcessor for FfmpegProcessor {
    fn process(&self, job: &ProcessingJob) -> Result<(), ProcessingError> {
        let args = self.arguments(job)?;
        debug!(program = %self.program.display(), ?args, "Running ffmpeg");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ProcessingError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        Err(ProcessingError::Failed {
            operation: job.operation,
            status: output.status.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn reencode_h264() -> Vec<String> {
    strings(&[
        "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-c:a", "copy", "-f", "mp4",
    ])
}

fn parameter<'a>(parameters: &'a Parameters, name: &str) -> Option<&'a str> {
    parameters
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn crf(parameters: &Parameters) -> Result<u8, ProcessingError> {
    let Some(value) = parameter(parameters, "crf") else {
        return Ok(28);
    };
    value
        .parse::<u8>()
        .ok()
        .filter(|crf| *crf <= 51)
        .ok_or_else(|| ProcessingError::invalid("crf", format!("{value:?} is not in 0..=51")))
}

fn resolution(parameters: &Parameters) -> Result<(u32, u32), ProcessingError> {
    match parameter(parameters, "size").unwrap_or("1") {
        "1" => Ok((1920, 1080)),
        "2" => Ok((1280, 720)),
        "3" => Ok((640, 480)),
        "4" => Ok((320, 240)),
        other => Err(ProcessingError::invalid(
            "size",
            format!("{other:?} is not one of 1, 2, 3, 4"),
        )),
    }
}

fn aspect_filter(parameters: &Parameters) -> Result<String, ProcessingError> {
    let (w, h) = match parameter(parameters, "ratio").unwrap_or("1") {
        "1" => (16, 9),
        "2" => (4, 3),
        "3" => (1, 1),
        other => {
            return Err(ProcessingError::invalid(
                "ratio",
                format!("{other:?} is not one of 1, 2, 3"),
            ));
        }
    };

    match parameter(parameters, "fit_mode").unwrap_or("1") {
        // letterbox: keep the picture, pad with black to the target ratio
        "1" => Ok(format!(
            "pad=w=max(iw\\,trunc(ih*{w}/{h}/2)*2):h=max(ih\\,trunc(iw*{h}/{w}/2)*2)\
             :x=(ow-iw)/2:y=(oh-ih)/2:color=black,setsar=1"
        )),
        // stretch: scale the width to the target ratio
        "2" => Ok(format!("scale=trunc(ih*{w}/{h}/2)*2:ih,setsar=1")),
        other => Err(ProcessingError::invalid(
            "fit_mode",
            format!("{other:?} is not one of 1 (letterbox), 2 (stretch)"),
        )),
    }
}

/// Accepts ffmpeg time values such as `10`, `1.5` or `00:00:10`.
fn time_value<'a>(parameters: &'a Parameters, name: &'static str) -> Result<&'a str, ProcessingError> {
    let value = parameter(parameters, name)
        .ok_or_else(|| ProcessingError::invalid(name, "required for trim"))?;
    let valid = value.starts_with(|c: char| c.is_ascii_digit())
        && value.chars().all(|c| c.is_ascii_digit() || c == ':' || c == '.');
    if !valid {
        return Err(ProcessingError::invalid(
            name,
            format!("{value:?} is not a time value"),
        ));
    }
    Ok(value)
}
