use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::classify::{self, JobKind};
use crate::config::Config;
use crate::control::ControlState;
use crate::encoder;
use crate::error::{CompressError, Result};
use crate::queue::JobQueue;

/// Sleep between queue polls while idle
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Per-job result: skipped jobs vanished before processing and are not
/// treated as failures.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Done,
    Skipped,
}

/// The single sequential worker: dequeue, classify, convert, finalize.
pub struct Worker {
    queue: Arc<JobQueue>,
    control: Arc<ControlState>,
    config: Config,
    /// Alternate working directory for encoder output; the finalized file is
    /// copied back next to the source afterwards
    workdir: Option<PathBuf>,
}

impl Worker {
    pub fn new(
        queue: Arc<JobQueue>,
        control: Arc<ControlState>,
        config: Config,
        workdir: Option<PathBuf>,
    ) -> Self {
        Self {
            queue,
            control,
            config,
            workdir,
        }
    }

    /// Drive the queue until shutdown. Graceful shutdown is honored only
    /// here, between jobs; a job already converting runs to completion
    /// first. Every per-job error is contained to that job.
    pub async fn run(&self) {
        loop {
            if self.control.stop_requested() {
                info!("Stop requested, worker exiting between jobs");
                std::process::exit(0);
            }

            if let Some(path) = self.queue.dequeue() {
                match self.process(&path).await {
                    Ok(Outcome::Done) => {
                        self.queue.finish_current();
                    }
                    Ok(Outcome::Skipped) => {}
                    Err(e) => {
                        // the original and any partial output stay behind
                        error!("Conversion of {} failed: {}", path, e);
                    }
                }
            }

            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    async fn process(&self, path: &str) -> Result<Outcome> {
        let source = Path::new(path);
        if !source.exists() {
            info!("{} does not exist (anymore), skipping", path);
            return Ok(Outcome::Skipped);
        }

        let kind = classify::classify(source);
        info!("Converting {} as {:?}", path, kind);

        let produced = match kind {
            JobKind::PlainFile => self.convert_plain(source).await?,
            JobKind::DvdFolder => self.convert_dvd(source).await?,
            JobKind::OpticalImage => self.convert_image(source).await?,
        };

        self.finalize(source, &produced).await?;
        Ok(Outcome::Done)
    }

    /// Plain video file: probe for the output resolution, encode next to the
    /// source (or into the working directory) as `<stem>-compressed.mp4`.
    async fn convert_plain(&self, source: &Path) -> Result<PathBuf> {
        let input = source.to_string_lossy().to_string();
        let resolution = encoder::probe_resolution(&self.config.encoder, &input).await;

        let stem = source
            .file_stem()
            .ok_or_else(|| CompressError::Classify(format!("Invalid filename: {:?}", source)))?
            .to_string_lossy();
        let output = self
            .output_dir(source)
            .join(format!("{}-compressed.mp4", stem));

        let audio = encoder::audio_codec_for(&self.config.encoder, &input);
        let command = encoder::compress_command(
            &self.config.encoder,
            &input,
            &resolution,
            &audio,
            self.control.threads(),
            &output,
        );
        encoder::supervise(command, &self.control).await?;

        Ok(output)
    }

    /// DVD folder: concatenate the main title's stream files and encode at
    /// the fixed DVD resolution as `compressed.mp4`.
    async fn convert_dvd(&self, source: &Path) -> Result<PathBuf> {
        let video_ts = classify::video_ts_dir(source);
        let vobs = classify::find_main_title(&video_ts)?;
        let input = classify::concat_input(&vobs);

        let output = self.output_dir(source).join("compressed.mp4");
        let command = encoder::compress_command(
            &self.config.encoder,
            &input,
            &self.config.encoder.dvd_resolution,
            "copy",
            self.control.threads(),
            &output,
        );
        encoder::supervise(command, &self.control).await?;

        Ok(output)
    }

    /// Optical image: mount, encode whatever content shape is found, and
    /// always attempt the unmount before reporting the conversion result.
    async fn convert_image(&self, source: &Path) -> Result<PathBuf> {
        // a leftover mount from an aborted run would shadow this image
        if let Err(e) = self.unmount().await {
            warn!("Pre-emptive unmount failed: {}", e);
        }
        self.mount(source).await?;

        let converted = self.convert_mounted(source).await;
        let unmounted = self.unmount().await;

        let produced = converted?;
        unmounted?;
        Ok(produced)
    }

    /// Encode the content of the mounted image: DVD-style trees go through
    /// the main-title heuristic, disc-image trees use their largest stream
    /// file, anything else is a classification error.
    async fn convert_mounted(&self, source: &Path) -> Result<PathBuf> {
        let mount_point = Path::new(&self.config.mount.mount_point);

        let (input, resolution) = if mount_point.join("VIDEO_TS").is_dir() {
            let vobs = classify::find_main_title(&mount_point.join("VIDEO_TS"))?;
            let first = vobs[0].to_string_lossy().to_string();
            let resolution = encoder::probe_resolution(&self.config.encoder, &first).await;
            (classify::concat_input(&vobs), resolution)
        } else if mount_point.join("BDMV").is_dir() {
            let stream = classify::largest_stream(&mount_point.join("BDMV"))?;
            let input = stream.to_string_lossy().to_string();
            let resolution = encoder::probe_resolution(&self.config.encoder, &input).await;
            (input, resolution)
        } else {
            return Err(CompressError::Classify(format!(
                "Unknown image format mounted from {:?}",
                source
            )));
        };

        let output = self.output_dir(source).join("compressed.mp4");
        let command = encoder::compress_command(
            &self.config.encoder,
            &input,
            &resolution,
            "copy",
            self.control.threads(),
            &output,
        );
        encoder::supervise(command, &self.control).await?;

        Ok(output)
    }

    /// Delete the original, relocate the product out of the working
    /// directory when one is configured, and hand the result to the
    /// configured owner. Failures here leave the produced output (and
    /// possibly the source) in place; the job is abandoned as-is.
    async fn finalize(&self, original: &Path, produced: &Path) -> Result<()> {
        let removal = if original.is_dir() {
            tokio::fs::remove_dir_all(original).await
        } else {
            tokio::fs::remove_file(original).await
        };
        removal.map_err(|e| {
            CompressError::PostProcess(format!("Failed to remove {:?}: {}", original, e))
        })?;
        info!("{} compressed and old one deleted", original.display());

        let mut final_path = produced.to_path_buf();
        if self.workdir.is_some() {
            let name = produced.file_name().ok_or_else(|| {
                CompressError::PostProcess(format!("Invalid output name: {:?}", produced))
            })?;
            let destination = original
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
                .join(name);

            info!("Copying {} -> {}", produced.display(), destination.display());
            tokio::fs::copy(produced, &destination).await.map_err(|e| {
                CompressError::PostProcess(format!("Copying to final destination: {}", e))
            })?;
            tokio::fs::remove_file(produced).await.map_err(|e| {
                CompressError::PostProcess(format!("Removing temporary file: {}", e))
            })?;
            final_path = destination;
        }

        nix::unistd::chown(
            &final_path,
            Some(nix::unistd::Uid::from_raw(self.config.owner.uid)),
            Some(nix::unistd::Gid::from_raw(self.config.owner.gid)),
        )
        .map_err(|e| CompressError::PostProcess(format!("Chowning {:?}: {}", final_path, e)))?;

        Ok(())
    }

    /// Encoder output lands in the working directory when configured,
    /// otherwise beside the source.
    fn output_dir(&self, source: &Path) -> PathBuf {
        match &self.workdir {
            Some(dir) => dir.clone(),
            None => source
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    async fn mount(&self, image: &Path) -> Result<()> {
        let image = image.to_string_lossy().to_string();
        self.run_mount_tool(&["mount", &image, &self.config.mount.mount_point])
            .await
            .map_err(|e| CompressError::Mount(format!("Mounting {}: {}", image, e)))
    }

    async fn unmount(&self) -> Result<()> {
        self.run_mount_tool(&["umount", &self.config.mount.mount_point])
            .await
            .map_err(|e| CompressError::Mount(format!("Unmounting: {}", e)))
    }

    /// Mounting needs elevated privileges; both commands are opaque
    /// collaborators judged only by their exit status.
    async fn run_mount_tool(&self, args: &[&str]) -> std::result::Result<(), String> {
        let (program, rest) = if self.config.mount.use_sudo {
            ("sudo", args)
        } else {
            (args[0], &args[1..])
        };

        let status = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| e.to_string())?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("{} exited with {}", program, status))
        }
    }
}
