use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CompressError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub encoder: EncoderConfig,
    pub mount: MountConfig,
    pub owner: OwnerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port the control channel listens on
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Constant rate factor, compromise between quality and size
    pub crf: u8,
    /// Video filter applied to every encode (deinterlacing)
    pub video_filter: String,
    /// Sources at or above this width are downscaled
    pub downscale_threshold: u32,
    /// Resolution used when a source is downscaled or probing fails
    pub downscale_target: String,
    /// Fixed resolution for DVD folder encodes
    pub dvd_resolution: String,
    /// File extension whose audio must be transcoded instead of copied
    pub transcode_audio_extension: String,
    /// Audio codec used for that extension
    pub transcode_audio_codec: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Mount point used for optical images, one job at a time
    pub mount_point: String,
    /// Run mount/umount through sudo
    pub use_sudo: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerConfig {
    /// Owner uid applied to the finalized output
    pub uid: u32,
    /// Owner gid applied to the finalized output
    pub gid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig { port: 1234 },
            encoder: EncoderConfig {
                binary_path: "ffmpeg".to_string(),
                crf: 27,
                video_filter: "yadif".to_string(),
                downscale_threshold: 1280,
                downscale_target: "1280x720".to_string(),
                dvd_resolution: "720x480".to_string(),
                transcode_audio_extension: "wmv".to_string(),
                transcode_audio_codec: "libvorbis".to_string(),
            },
            mount: MountConfig {
                mount_point: "/media/film".to_string(),
                use_sudo: true,
            },
            owner: OwnerConfig {
                uid: 1000,
                gid: 1000,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CompressError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| CompressError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CompressError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CompressError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_encoder_invocation_contract() {
        let config = Config::default();
        assert_eq!(config.server.port, 1234);
        assert_eq!(config.encoder.crf, 27);
        assert_eq!(config.encoder.video_filter, "yadif");
        assert_eq!(config.encoder.downscale_threshold, 1280);
        assert_eq!(config.mount.mount_point, "/media/film");
        assert_eq!(config.owner.uid, 1000);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.server.port = 4321;
        config.encoder.crf = 30;
        config.save_to_file(&path).expect("save");

        let loaded = Config::from_file(&path).expect("load");
        assert_eq!(loaded.server.port, 4321);
        assert_eq!(loaded.encoder.crf, 30);
        assert_eq!(loaded.mount.mount_point, config.mount.mount_point);
    }
}
