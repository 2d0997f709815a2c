//! Image family: png, jpeg/jpg, gif, heic.
//!
//! Raster formats are decoded and encoded in-process with the `image` crate.
//! HEIC has no in-process decoder, so it is staged through the engine and
//! decoded from the PNG the engine produces. Output is bounded to the
//! configured maximum dimension before encoding.

use std::io::Cursor;

use async_trait::async_trait;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, Frame, ImageEncoder};

use cf_core::{Error, Format, ImageSettings, Result};

use super::{blocking, stage, ConversionContext, ConversionRequest, FormatConverter};

/// Converter for the image family.
#[derive(Debug, Clone)]
pub struct ImageConverter {
    max_dimension: u32,
}

impl ImageConverter {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Decode `bytes` (any in-process format), bound and encode as `target`.
    /// Used by the media converter for stills the engine extracted.
    pub async fn transcode(
        &self,
        bytes: Vec<u8>,
        target: Format,
        settings: ImageSettings,
    ) -> Result<Vec<u8>> {
        ensure_writable(target)?;
        let max = self.max_dimension;
        blocking(move || {
            let img = bound(decode(&bytes)?, max);
            encode(&img, target, settings)
        })
        .await
    }

    /// Run HEIC input through the engine and return PNG bytes.
    async fn heic_to_png(&self, bytes: &[u8], ctx: &ConversionContext<'_>) -> Result<Vec<u8>> {
        let engine = ctx.engine()?;
        let input = ctx.scoped_name("input", Format::Heic);
        let output = ctx.scoped_name("still", Format::Png);

        let result = async {
            engine.write_file(&input, bytes).await?;
            engine
                .exec(&[
                    "-i".to_string(),
                    input.clone(),
                    "-frames:v".to_string(),
                    "1".to_string(),
                    output.clone(),
                ])
                .await?;
            engine.read_file(&output).await
        }
        .await;

        for name in [&input, &output] {
            if let Err(e) = engine.delete_file(name).await {
                tracing::warn!(job = %ctx.job_id, file = %name, error = %e, "failed to clean engine file");
            }
        }
        result
    }
}

impl Default for ImageConverter {
    fn default() -> Self {
        Self::new(4096)
    }
}

fn ensure_writable(target: Format) -> Result<()> {
    match target {
        Format::Png | Format::Jpeg | Format::Jpg | Format::Gif => Ok(()),
        other => Err(Error::unsupported_target("image", other)),
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(stage("decode image"))
}

/// Shrink to fit within `max` x `max`, keeping the aspect ratio. Images that
/// already fit are returned untouched.
pub fn bound(img: DynamicImage, max: u32) -> DynamicImage {
    if img.width() <= max && img.height() <= max {
        return img;
    }
    img.resize(max, max, FilterType::Lanczos3)
}

/// Encode as `target` with the given settings.
pub fn encode(img: &DynamicImage, target: Format, settings: ImageSettings) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match target {
        Format::Jpeg | Format::Jpg => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut out, settings.quality_percent())
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(stage("encode jpeg"))?;
        }
        Format::Png => {
            let rgba = img.to_rgba8();
            let compression = if settings.compress {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            PngEncoder::new_with_quality(&mut out, compression, PngFilter::Adaptive)
                .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
                .map_err(stage("encode png"))?;
        }
        Format::Gif => {
            let frame = Frame::new(img.to_rgba8());
            let mut encoder = GifEncoder::new(Cursor::new(&mut out));
            encoder.encode_frame(frame).map_err(stage("encode gif"))?;
        }
        other => return Err(Error::unsupported_target("image", other)),
    }
    Ok(out)
}

#[async_trait]
impl FormatConverter for ImageConverter {
    fn name(&self) -> &'static str {
        "image"
    }

    fn requires_engine(&self, source: Format, _target: Format) -> bool {
        source == Format::Heic
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        ctx: &ConversionContext<'_>,
    ) -> Result<Vec<u8>> {
        let target = request.target;
        if ensure_writable(target).is_err() {
            return Err(Error::unsupported_target(request.source, target));
        }
        let settings = request.settings.image();
        let max = self.max_dimension;

        let decoded = if request.source == Format::Heic {
            let png = self.heic_to_png(&request.bytes, ctx).await?;
            blocking(move || decode(&png)).await?
        } else {
            let bytes = request.bytes.clone();
            blocking(move || decode(&bytes)).await?
        };
        ctx.progress.report(40);
        tracing::debug!(
            job = %ctx.job_id,
            width = decoded.width(),
            height = decoded.height(),
            "image decoded"
        );

        let out = blocking(move || encode(&bound(decoded, max), target, settings)).await?;
        ctx.progress.report(90);
        Ok(out)
    }
}
