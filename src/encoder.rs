use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::EncoderConfig;
use crate::control::ControlState;
use crate::error::{CompressError, Result};

/// Interval between supervisor polls of the running encoder
const SUPERVISE_POLL: Duration = Duration::from_secs(2);

const RESOLUTION_PATTERN: &str = r"([0-9]{2,5})x([0-9]{2,5})";

/// One assembled encoder invocation
#[derive(Debug, Clone)]
pub struct EncodeCommand {
    pub program: String,
    pub args: Vec<String>,
    pub description: String,
}

impl EncodeCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(program: S1, description: S2) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn input<S: Into<String>>(self, input: S) -> Self {
        self.arg("-i").arg(input)
    }

    pub fn no_subtitles(self) -> Self {
        self.arg("-sn")
    }

    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.arg("-crf").arg(crf.to_string())
    }

    pub fn resolution<S: Into<String>>(self, resolution: S) -> Self {
        self.arg("-s").arg(resolution)
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn threads(self, threads: i32) -> Self {
        self.arg("-threads").arg(threads.to_string())
    }

    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }
}

/// Assemble the compression invocation shared by every strategy: x264 video
/// with deinterlacing, fixed CRF, target resolution, pass-through (or
/// transcoded) audio and a thread-count hint.
pub fn compress_command(
    config: &EncoderConfig,
    input: &str,
    resolution: &str,
    audio_codec: &str,
    threads: i32,
    output: &Path,
) -> EncodeCommand {
    EncodeCommand::new(&config.binary_path, "Video compression")
        .input(input)
        .no_subtitles()
        .video_codec("libx264")
        .video_filter(&config.video_filter)
        .crf(config.crf)
        .resolution(resolution)
        .audio_codec(audio_codec)
        .threads(threads)
        .overwrite()
        .output(output)
}

/// Audio handling for a source: pass-through, except for the one legacy
/// container whose audio the mp4 mux cannot carry.
pub fn audio_codec_for(config: &EncoderConfig, input: &str) -> String {
    if input
        .to_lowercase()
        .ends_with(&config.transcode_audio_extension)
    {
        config.transcode_audio_codec.clone()
    } else {
        "copy".to_string()
    }
}

/// Probe a file's resolution by running the encoder in metadata-only mode
/// and scanning its diagnostics for the video stream line. Sources narrower
/// than the downscale threshold keep their own resolution; everything else
/// (including unparseable output) gets the fixed downscale target.
pub async fn probe_resolution(config: &EncoderConfig, input: &str) -> String {
    let output = Command::new(&config.binary_path)
        .arg("-i")
        .arg(input)
        .stdin(Stdio::null())
        .output()
        .await;

    let probed = match output {
        Ok(output) => {
            // ffmpeg prints stream info on stderr and exits non-zero without
            // an output file; only the diagnostics matter here
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            parse_video_resolution(&combined)
        }
        Err(e) => {
            warn!("Probing {} failed: {}", input, e);
            None
        }
    };

    select_resolution(probed, config)
}

/// Extract the first width x height pair from a video stream description
/// line of the encoder's diagnostic output.
pub fn parse_video_resolution(diagnostics: &str) -> Option<(u32, u32)> {
    let resolution_regex = Regex::new(RESOLUTION_PATTERN).ok()?;
    for line in diagnostics.lines() {
        if !line.contains(": Video:") {
            continue;
        }
        if let Some(captures) = resolution_regex.captures(line) {
            let width = captures[1].parse().ok()?;
            let height = captures[2].parse().ok()?;
            return Some((width, height));
        }
    }
    None
}

/// Apply the downscale policy to a probed resolution.
pub fn select_resolution(probed: Option<(u32, u32)>, config: &EncoderConfig) -> String {
    match probed {
        Some((width, height)) if width < config.downscale_threshold => {
            format!("{}x{}", width, height)
        }
        _ => config.downscale_target.clone(),
    }
}

/// Start the encoder and supervise it to completion.
///
/// The child inherits the daemon's stdout/stderr, so encoder progress lands
/// in the daemon's own log stream and never reaches a client. Between polls
/// the supervisor applies pause-state transitions by suspending or resuming
/// the child; this is the only place pause/resume takes effect.
pub async fn supervise(command: EncodeCommand, control: &ControlState) -> Result<()> {
    info!(
        "{}: starting {} {:?}",
        command.description, command.program, command.args
    );

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| CompressError::Encode {
            program: command.program.clone(),
            detail: format!("failed to start: {}", e),
        })?;

    let mut suspended = false;
    loop {
        if let Some(status) = child.try_wait().map_err(|e| CompressError::Encode {
            program: command.program.clone(),
            detail: format!("failed to poll: {}", e),
        })? {
            if status.success() {
                info!("{}: completed", command.description);
                return Ok(());
            }
            return Err(CompressError::Encode {
                program: command.program.clone(),
                detail: format!("return code: {}", status),
            });
        }

        let pause = control.pause_requested();
        if pause != suspended {
            if let Some(id) = child.id() {
                let signal = if pause { Signal::SIGSTOP } else { Signal::SIGCONT };
                debug!("Sending {:?} to encoder pid {}", signal, id);
                if let Err(e) = kill(Pid::from_raw(id as i32), signal) {
                    warn!("Failed to signal encoder process: {}", e);
                } else {
                    suspended = pause;
                }
            }
        }

        tokio::time::sleep(SUPERVISE_POLL).await;
    }
}
