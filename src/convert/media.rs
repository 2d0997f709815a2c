//! Media family: wav, mp3, mp4, mov.
//!
//! All media work runs in the engine. The converter stages the input under a
//! job-scoped name, runs one ffmpeg command built from the resolved
//! [`MediaSettings`], reads the output back and always removes both files.
//! Still-image targets are produced as PNG by the engine and then finished
//! by the image converter so they get the same bounding and encoding.

use std::sync::Arc;

use async_trait::async_trait;

use cf_core::{Error, Format, FormatGroup, MediaSettings, Result};

use super::image::ImageConverter;
use super::{ConversionContext, ConversionRequest, FormatConverter};

/// Widest video frame written when compressing.
const MAX_VIDEO_WIDTH: u32 = 1920;
/// Waveform canvas for audio-to-image.
const WAVEFORM_SIZE: &str = "1280x320";

/// Converter for audio and video.
#[derive(Debug, Clone)]
pub struct MediaConverter {
    images: Arc<ImageConverter>,
}

impl MediaConverter {
    pub fn new(images: Arc<ImageConverter>) -> Self {
        Self { images }
    }
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Double an ffmpeg rate (`2M` -> `4M`, `192k` -> `384k`) for `-bufsize`.
fn double_rate(rate: &str) -> String {
    let split = rate
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rate.len());
    match rate[..split].parse::<u64>() {
        Ok(n) => format!("{}{}", n * 2, &rate[split..]),
        Err(_) => rate.to_string(),
    }
}

fn audio_codec_args(args: &mut Vec<String>, target: Format, settings: &MediaSettings) {
    match target {
        Format::Mp3 => {
            push(args, &["-codec:a", "libmp3lame"]);
            match &settings.bitrate {
                Some(rate) => push(args, &["-b:a", rate]),
                None => push(args, &["-q:a", "0"]),
            }
        }
        _ => push(args, &["-codec:a", "pcm_s16le"]),
    }
}

fn video_codec_args(args: &mut Vec<String>, settings: &MediaSettings) {
    let crf = settings.crf.to_string();
    push(
        args,
        &["-codec:v", "libx264", "-preset", "medium", "-crf", &crf, "-pix_fmt", "yuv420p"],
    );
    if let Some(rate) = &settings.bitrate {
        push(args, &["-maxrate", rate, "-bufsize", &double_rate(rate)]);
    }
    if settings.compress {
        let scale = format!("scale='min({MAX_VIDEO_WIDTH},iw)':-2");
        push(args, &["-vf", &scale]);
    }
    let audio_rate = if settings.compress { "128k" } else { "192k" };
    push(args, &["-codec:a", "aac", "-b:a", audio_rate, "-movflags", "+faststart"]);
}

/// The ffmpeg arguments for one conversion. `output` must carry the
/// extension of the format the engine is asked to produce.
pub fn build_args(
    source: Format,
    target: Format,
    input: &str,
    output: &str,
    settings: &MediaSettings,
) -> Result<Vec<String>> {
    let mut args = vec!["-i".to_string(), input.to_string()];
    match (source.group(), target.group()) {
        (FormatGroup::Audio, FormatGroup::Audio) | (FormatGroup::Video, FormatGroup::Audio) => {
            push(&mut args, &["-vn"]);
            audio_codec_args(&mut args, target, settings);
        }
        (FormatGroup::Video, FormatGroup::Video) => video_codec_args(&mut args, settings),
        (FormatGroup::Video, FormatGroup::Image) => {
            push(&mut args, &["-vf", "thumbnail", "-frames:v", "1"]);
        }
        (FormatGroup::Audio, FormatGroup::Image) => {
            let filter = format!("showwavespic=s={WAVEFORM_SIZE}");
            push(&mut args, &["-filter_complex", &filter, "-frames:v", "1"]);
        }
        _ => return Err(Error::unsupported_target(source, target)),
    }
    args.push(output.to_string());
    Ok(args)
}

#[async_trait]
impl FormatConverter for MediaConverter {
    fn name(&self) -> &'static str {
        "media"
    }

    fn requires_engine(&self, _source: Format, _target: Format) -> bool {
        true
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        ctx: &ConversionContext<'_>,
    ) -> Result<Vec<u8>> {
        let source = request.source;
        let target = request.target;
        let still = target.group() == FormatGroup::Image;
        if still && target == Format::Heic {
            return Err(Error::unsupported_target(source, target));
        }

        // Stills come out of the engine as PNG and are re-encoded here.
        let engine_target = if still { Format::Png } else { target };
        let media_settings = request.settings.media();
        let input = ctx.scoped_name("input", source);
        let output = ctx.scoped_name("output", engine_target);
        let args = build_args(source, engine_target, &input, &output, &media_settings)?;

        let engine = ctx.engine()?;
        tracing::debug!(job = %ctx.job_id, engine = engine.name(), ?args, "running media command");

        let result = async {
            engine.write_file(&input, &request.bytes).await?;
            ctx.progress.report(40);
            engine.exec(&args).await?;
            engine.read_file(&output).await
        }
        .await;

        for name in [&input, &output] {
            if let Err(e) = engine.delete_file(name).await {
                tracing::warn!(job = %ctx.job_id, file = %name, error = %e, "failed to clean engine file");
            }
        }
        let produced = result?;
        if produced.is_empty() {
            return Err(Error::conversion("media", "engine produced an empty file"));
        }

        let out = if still {
            self.images
                .transcode(produced, target, request.settings.image())
                .await?
        } else {
            produced
        };
        ctx.progress.report(90);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::compression::resolve;
    use cf_core::CompressionLevel;

    fn settings(target: Format, level: CompressionLevel) -> MediaSettings {
        resolve(target, level).media()
    }

    fn joined(args: &[String]) -> String {
        args.join(" ")
    }

    #[test]
    fn wav_to_mp3_uses_bitrate_or_vbr() {
        let args = build_args(
            Format::Wav,
            Format::Mp3,
            "in.wav",
            "out.mp3",
            &settings(Format::Mp3, CompressionLevel::Medium),
        )
        .unwrap();
        assert_eq!(joined(&args), "-i in.wav -vn -codec:a libmp3lame -b:a 192k out.mp3");

        let args = build_args(
            Format::Wav,
            Format::Mp3,
            "in.wav",
            "out.mp3",
            &settings(Format::Mp3, CompressionLevel::None),
        )
        .unwrap();
        assert!(joined(&args).contains("-q:a 0"));
    }

    #[test]
    fn mp3_to_wav_is_pcm() {
        let args = build_args(
            Format::Mp3,
            Format::Wav,
            "a",
            "b.wav",
            &settings(Format::Wav, CompressionLevel::High),
        )
        .unwrap();
        assert!(joined(&args).contains("-codec:a pcm_s16le"));
    }

    #[test]
    fn video_reencode_caps_rate_and_width() {
        let args = build_args(
            Format::Mov,
            Format::Mp4,
            "in.mov",
            "out.mp4",
            &settings(Format::Mp4, CompressionLevel::High),
        )
        .unwrap();
        let line = joined(&args);
        assert!(line.contains("-codec:v libx264"));
        assert!(line.contains("-crf 26"));
        assert!(line.contains("-maxrate 1M -bufsize 2M"));
        assert!(line.contains("scale='min(1920,iw)':-2"));
        assert!(line.contains("-movflags +faststart"));
        assert!(line.ends_with("out.mp4"));
    }

    #[test]
    fn uncompressed_video_has_no_scale() {
        let args = build_args(
            Format::Mp4,
            Format::Mov,
            "a",
            "b.mov",
            &settings(Format::Mov, CompressionLevel::None),
        )
        .unwrap();
        let line = joined(&args);
        assert!(!line.contains("scale="));
        assert!(!line.contains("-maxrate"));
        assert!(line.contains("-crf 18"));
    }

    #[test]
    fn cross_group_commands() {
        let s = MediaSettings::default();
        let extract = build_args(Format::Mp4, Format::Wav, "v", "a.wav", &s).unwrap();
        assert!(extract.contains(&"-vn".to_string()));

        let thumb = build_args(Format::Mov, Format::Png, "v", "t.png", &s).unwrap();
        assert!(joined(&thumb).contains("-vf thumbnail -frames:v 1"));

        let wave = build_args(Format::Wav, Format::Png, "a", "w.png", &s).unwrap();
        assert!(joined(&wave).contains("showwavespic=s=1280x320"));

        let err = build_args(Format::Wav, Format::Mp4, "a", "b.mp4", &s).unwrap_err();
        assert_eq!(err.kind(), cf_core::ErrorKind::UnsupportedTarget);
    }

    #[test]
    fn rate_doubling() {
        assert_eq!(double_rate("2M"), "4M");
        assert_eq!(double_rate("192k"), "384k");
        assert_eq!(double_rate("x"), "x");
    }
}
