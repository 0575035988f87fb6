use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::fs;
use tokio::process::Command;

use crate::config::FfmpegConfig;

/// Lines of ffmpeg stderr kept in the error when an encode fails.
const STDERR_TAIL_LINES: usize = 20;

/// Joins local video files end-to-end into one output file.
#[async_trait]
pub trait Concatenator: Send + Sync {
    async fn concatenate(&self, clips: &[PathBuf], output: &Path) -> Result<()>;
}

/// Concatenates with ffmpeg's concat demuxer and re-encodes the result.
pub struct FfmpegConcatenator {
    binary: String,
    video_codec: String,
    audio_codec: String,
}

impl FfmpegConcatenator {
    pub fn new(config: &FfmpegConfig) -> Self {
        FfmpegConcatenator {
            binary: config.binary.clone(),
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
        }
    }

    fn args(&self, manifest: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-y", // Overwrite output if it exists
            "-hide_banner",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(manifest.as_os_str().to_owned());
        for arg in [
            "-c:v",
            self.video_codec.as_str(),
            "-c:a",
            self.audio_codec.as_str(),
            "-movflags",
            "+faststart",
        ] {
            args.push(OsString::from(arg));
        }
        args.push(output.as_os_str().to_owned());
        args
    }
}

/// Builds an ffmpeg concat manifest: one `file '<path>'` line per clip.
pub fn concat_manifest(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', r"'\''")))
        .collect()
}

fn manifest_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".concat.txt");
    output.with_file_name(name)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn concatenate(&self, clips: &[PathBuf], output: &Path) -> Result<()> {
        ensure!(!clips.is_empty(), "no clips to concatenate");

        let output_dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let output_name = output
            .file_name()
            .with_context(|| format!("output path {} has no file name", output.display()))?;
        fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        let resolved_output = fs::canonicalize(output_dir)
            .await
            .with_context(|| format!("failed to resolve {}", output_dir.display()))?
            .join(output_name);

        // The demuxer resolves relative entries against the manifest location.
        let mut absolute = Vec::with_capacity(clips.len());
        for clip in clips {
            let path = fs::canonicalize(clip)
                .await
                .with_context(|| format!("clip {} is not readable", clip.display()))?;
            absolute.push(path);
        }
        ensure!(
            !absolute.contains(&resolved_output),
            "output path {} is also an input clip",
            output.display()
        );

        let manifest = manifest_path(output);
        fs::write(&manifest, concat_manifest(&absolute))
            .await
            .with_context(|| format!("failed to write {}", manifest.display()))?;

        let args = self.args(&manifest, output);
        debug!("Running {} {:?}", self.binary, args);
        let result = Command::new(&self.binary).args(&args).output().await;

        if let Err(err) = fs::remove_file(&manifest).await {
            warn!("Failed to remove {}: {}", manifest.display(), err);
        }

        let ffmpeg = result.with_context(|| format!("failed to run {}", self.binary))?;
        if !ffmpeg.status.success() {
            let tail = stderr_tail(&ffmpeg.stderr);
            error!("ffmpeg stderr: {}", tail);
            bail!(
                "ffmpeg failed to concatenate {} clips ({}): {}",
                clips.len(),
                ffmpeg.status,
                tail
            );
        }

        info!(
            "Concatenated {} clips into {}",
            clips.len(),
            output.display()
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn concatenator(binary: &str) -> FfmpegConcatenator {
        FfmpegConcatenator::new(&FfmpegConfig {
            binary: binary.into(),
            video_codec: "libx264".into(),
            audio_codec: "aac".into(),
        })
    }

    #[test]
    fn manifest_lists_clips_in_order() {
        let manifest = concat_manifest(&[
            PathBuf::from("/tmp/clips/a.mp4"),
            PathBuf::from("/tmp/clips/b.mp4"),
        ]);
        assert_eq!(
            manifest,
            "file '/tmp/clips/a.mp4'\nfile '/tmp/clips/b.mp4'\n"
        );
    }

    #[test]
    fn manifest_escapes_single_quotes() {
        let manifest = concat_manifest(&[PathBuf::from("/tmp/o'brien.mp4")]);
        assert_eq!(manifest, "file '/tmp/o'\\''brien.mp4'\n");
    }

    #[test]
    fn manifest_sits_next_to_output() {
        assert_eq!(
            manifest_path(Path::new("out/concatenated_output.mp4")),
            PathBuf::from("out/concatenated_output.mp4.concat.txt")
        );
    }

    #[test]
    fn args_encode_with_configured_codecs() {
        let args = concatenator("ffmpeg").args(Path::new("list.txt"), Path::new("out.mp4"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-y", "-hide_banner", "-f", "concat", "-safe", "0", "-i", "list.txt", "-c:v",
                "libx264", "-c:a", "aac", "-movflags", "+faststart", "out.mp4",
            ]
        );
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[tokio::test]
    async fn empty_clip_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = concatenator("ffmpeg")
            .concatenate(&[], &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no clips"));
    }

    #[tokio::test]
    async fn output_overlapping_an_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("a.mp4");
        std::fs::write(&clip, b"a").unwrap();
        let err = concatenator("ffmpeg")
            .concatenate(&[clip.clone()], &clip)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("also an input"));
    }

    #[tokio::test]
    async fn output_reaching_an_input_through_parent_segments_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let clips_dir = dir.path().join("clips");
        std::fs::create_dir(&clips_dir).unwrap();
        let clip = clips_dir.join("a.mp4");
        std::fs::write(&clip, b"a").unwrap();

        let err = concatenator("ffmpeg")
            .concatenate(&[clip], &clips_dir.join("..").join("clips").join("a.mp4"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("also an input"));
        assert_eq!(std::fs::read(clips_dir.join("a.mp4")).unwrap(), b"a");
    }

    #[tokio::test]
    async fn missing_binary_fails_and_removes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("a.mp4");
        std::fs::write(&clip, b"a").unwrap();
        let output = dir.path().join("out.mp4");

        let result = concatenator("/nonexistent/ffmpeg-binary")
            .concatenate(&[clip], &output)
            .await;

        assert!(result.is_err());
        assert!(!manifest_path(&output).exists());
    }

    fn tool_reports(binary: &str, args: &[&str], needle: &str) -> bool {
        std::process::Command::new(binary)
            .args(args)
            .output()
            .map(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).contains(needle))
            .unwrap_or(false)
    }

    fn write_test_clip(ffmpeg: &str, path: &Path, seconds: u32) {
        let video = format!("testsrc=duration={seconds}:size=160x120:rate=25");
        let audio = format!("sine=frequency=440:duration={seconds}");
        let status = std::process::Command::new(ffmpeg)
            .args([
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "lavfi",
                "-i",
                video.as_str(),
                "-f",
                "lavfi",
                "-i",
                audio.as_str(),
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-shortest",
            ])
            .arg(path)
            .status()
            .unwrap();
        assert!(status.success(), "could not generate {}", path.display());
    }

    fn duration_secs(ffprobe: &str, path: &Path) -> f64 {
        let out = std::process::Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .unwrap();
        String::from_utf8_lossy(&out.stdout).trim().parse().unwrap()
    }

    #[tokio::test]
    async fn ffmpeg_output_lasts_as_long_as_its_inputs() {
        let ffmpeg = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".into());
        let ffprobe = "ffprobe";
        if !tool_reports(&ffmpeg, &["-hide_banner", "-encoders"], "libx264")
            || !tool_reports(ffprobe, &["-version"], "ffprobe")
        {
            eprintln!("ffmpeg with libx264 and ffprobe are required, skipping");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.mp4");
        let second = dir.path().join("b.mp4");
        write_test_clip(&ffmpeg, &first, 1);
        write_test_clip(&ffmpeg, &second, 2);
        let expected = duration_secs(ffprobe, &first) + duration_secs(ffprobe, &second);

        let output = dir.path().join("out").join("concatenated_output.mp4");
        concatenator(&ffmpeg)
            .concatenate(&[first, second], &output)
            .await
            .unwrap();

        let actual = duration_secs(ffprobe, &output);
        assert!(
            (actual - expected).abs() < 0.3,
            "output lasts {actual}s, inputs {expected}s"
        );
        assert!(!manifest_path(&output).exists());
    }
}
