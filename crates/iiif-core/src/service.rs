//! Async request driver.
//!
//! [`ImageService::render`] runs one request end to end:
//!
//! 1. reject the output format if no encoder can produce it,
//! 2. identify the source and resolve geometry against the server ceilings,
//! 3. decode the crop region on a blocking worker,
//! 4. run the raster pipeline on a blocking worker.
//!
//! The caller's [`CancellationToken`] is checked before each stage and raced
//! against the blocking work, so a cancelled request returns as soon as the
//! token fires. The abandoned worker finishes in the background and its
//! result is dropped.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ImageServerConfig;
use crate::decode::{ImageSource, RegionDecoder};
use crate::encode::EncoderTable;
use crate::error::{PipelineError, PipelineResult};
use crate::geometry::{resolve, ProcessState};
use crate::pipeline::Pipeline;
use crate::request::RequestSpec;

/// Encoded output of one request.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    /// Geometry the output was produced with.
    pub state: ProcessState,
}

/// Image request driver over a decoder.
pub struct ImageService<D> {
    decoder: Arc<D>,
    pipeline: Arc<Pipeline>,
    config: ImageServerConfig,
}

impl<D> Clone for ImageService<D> {
    fn clone(&self) -> Self {
        Self {
            decoder: Arc::clone(&self.decoder),
            pipeline: Arc::clone(&self.pipeline),
            config: self.config.clone(),
        }
    }
}

impl<D: RegionDecoder + 'static> ImageService<D> {
    pub fn new(decoder: D, config: ImageServerConfig) -> Self {
        Self {
            decoder: Arc::new(decoder),
            pipeline: Arc::new(Pipeline::default()),
            config,
        }
    }

    /// Replace the encoder table, e.g. to add a jp2 encoder.
    pub fn with_encoders(self, encoders: EncoderTable) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(encoders)),
            ..self
        }
    }

    pub fn config(&self) -> &ImageServerConfig {
        &self.config
    }

    #[instrument(skip_all, fields(id = %spec.id, format = %spec.format))]
    pub async fn render(
        &self,
        source: Arc<ImageSource>,
        spec: RequestSpec,
        cancel: CancellationToken,
    ) -> PipelineResult<RenderedImage> {
        let format = self.pipeline.check_format(&spec)?;
        let spec = Arc::new(self.config.apply_limits(spec));

        let info = {
            let decoder = Arc::clone(&self.decoder);
            let source = Arc::clone(&source);
            run_blocking(&cancel, &spec.id, move || Ok(decoder.identify(&source)?)).await?
        };

        let (h_dpi, v_dpi) = info
            .dpi
            .unwrap_or((self.config.default_dpi, self.config.default_dpi));
        let state = resolve(&spec, info.width, info.height, self.config.allow_upscale)?
            .with_source_resolution(h_dpi, v_dpi);
        debug!(
            source_width = info.width,
            source_height = info.height,
            output_width = state.output_width(),
            output_height = state.output_height(),
            "Resolved request geometry"
        );

        let decoded = {
            let decoder = Arc::clone(&self.decoder);
            let source = Arc::clone(&source);
            let region = state.crop_region();
            let reduction = state.image_scale();
            run_blocking(&cancel, &spec.id, move || {
                Ok(decoder.decode(&source, region, reduction)?)
            })
            .await?
        };
        if (decoded.native_width, decoded.native_height) != (info.width, info.height) {
            warn!(
                identified = ?(info.width, info.height),
                decoded = ?(decoded.native_width, decoded.native_height),
                "Decoder reported different source dimensions"
            );
        }

        let bytes = {
            let pipeline = Arc::clone(&self.pipeline);
            let job_spec = Arc::clone(&spec);
            let state = state.clone();
            let quality = self.config.quality_config();
            let token = cancel.clone();
            run_blocking(&cancel, &spec.id, move || {
                pipeline.process_cancellable(&decoded.image, &state, &job_spec, &quality, &token)
            })
            .await?
        };

        info!(
            output_width = state.output_width(),
            output_height = state.output_height(),
            bytes = bytes.len(),
            "Rendered image"
        );

        Ok(RenderedImage {
            bytes,
            mime_type: format.mime_type(),
            state,
        })
    }
}

/// Run `work` on the blocking pool unless `cancel` fires first.
async fn run_blocking<T, F>(cancel: &CancellationToken, id: &str, work: F) -> PipelineResult<T>
where
    F: FnOnce() -> PipelineResult<T> + Send + 'static,
    T: Send + 'static,
{
    let cancelled = || PipelineError::Cancelled { id: id.to_string() };
    if cancel.is_cancelled() {
        return Err(cancelled());
    }

    let handle = tokio::task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!(id = %id, "Request cancelled");
            Err(cancelled())
        }
        joined = handle => joined.map_err(|e| PipelineError::Internal {
            message: format!("worker task failed: {e}"),
        })?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::{ImageEncoder, Rgba, RgbaImage};

    use crate::decode::{
        DecodeError, DecodedImage, DecodedRegion, ImageCrateDecoder, MemorySource, SourceInfo,
    };
    use crate::geometry::CropRegion;
    use crate::request::{RegionSpec, SizeSpec};

    fn png_source(id: &str, width: u32, height: u32) -> Arc<ImageSource> {
        let img = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 90, 255]));
        let mut out = Vec::new();
        image::codecs::png::PngEncoder::new(&mut out)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
            .unwrap();
        Arc::new(ImageSource::new(id, MemorySource::new(out)))
    }

    /// Fixed-size decoder that counts calls and can cancel mid-request.
    struct StubDecoder {
        calls: Arc<AtomicUsize>,
        cancel_on_decode: Option<CancellationToken>,
    }

    impl StubDecoder {
        fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                cancel_on_decode: None,
            }
        }
    }

    impl RegionDecoder for StubDecoder {
        fn identify(&self, _source: &ImageSource) -> Result<SourceInfo, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SourceInfo {
                width: 40,
                height: 20,
                dpi: Some((300, 300)),
            })
        }

        fn decode(
            &self,
            _source: &ImageSource,
            region: CropRegion,
            _reduction: f64,
        ) -> Result<DecodedRegion, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_decode {
                token.cancel();
            }
            Ok(DecodedRegion {
                image: DecodedImage::blank(region.width, region.height),
                native_width: 40,
                native_height: 20,
            })
        }
    }

    fn stub_source() -> Arc<ImageSource> {
        Arc::new(ImageSource::new("stub", MemorySource::new(Vec::new())))
    }

    #[tokio::test]
    async fn test_render_png_source_to_jpeg() {
        let service = ImageService::new(ImageCrateDecoder::new(), ImageServerConfig::default());
        let spec = RequestSpec::new("gradient", "jpg")
            .with_region(RegionSpec::square())
            .with_size(SizeSpec::best_fit(Some(50), Some(50)));

        let rendered = service
            .render(png_source("gradient", 300, 200), spec, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rendered.mime_type, "image/jpeg");
        assert_eq!(rendered.state.crop_region().x, 50);
        let decoded = image::load_from_memory(&rendered.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 50));
    }

    #[tokio::test]
    async fn test_server_ceiling_applies() {
        let config = ImageServerConfig {
            max_width: Some(10),
            max_height: Some(10),
            ..Default::default()
        };
        let service = ImageService::new(ImageCrateDecoder::new(), config);
        let spec = RequestSpec::new("wide", "png");

        let rendered = service
            .render(png_source("wide", 300, 200), spec, CancellationToken::new())
            .await
            .unwrap();

        let decoded = image::load_from_memory(&rendered.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 7));
    }

    #[tokio::test]
    async fn test_unknown_source_dpi_uses_default() {
        let service = ImageService::new(ImageCrateDecoder::new(), ImageServerConfig::default());
        let spec = RequestSpec::new("half", "png").with_size(SizeSpec::percentage(0.5));

        let rendered = service
            .render(png_source("half", 20, 20), spec, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rendered.state.horizontal_resolution(), 36);
        assert_eq!(rendered.state.vertical_resolution(), 36);
    }

    #[tokio::test]
    async fn test_native_dpi_scaled_by_output() {
        let service = ImageService::new(StubDecoder::new(), ImageServerConfig::default());
        let spec = RequestSpec::new("stub", "png").with_size(SizeSpec::best_fit(Some(20), None));

        let rendered = service
            .render(stub_source(), spec, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rendered.state.output_extent().width, 20);
        assert_eq!(rendered.state.horizontal_resolution(), 150);
    }

    #[tokio::test]
    async fn test_unsupported_format_skips_decoder() {
        let decoder = StubDecoder::new();
        let calls = Arc::clone(&decoder.calls);
        let service = ImageService::new(decoder, ImageServerConfig::default());

        let err = service
            .render(stub_source(), RequestSpec::new("stub", "jp2"), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
        assert!(err.is_client_error());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_geometry() {
        let service = ImageService::new(StubDecoder::new(), ImageServerConfig::default());
        let spec = RequestSpec::new("stub", "png")
            .with_region(RegionSpec::region(50.0, 0.0, 10.0, 10.0));

        let err = service
            .render(stub_source(), spec, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidGeometry(_)));
    }

    #[tokio::test]
    async fn test_decode_failure_propagates() {
        let service = ImageService::new(ImageCrateDecoder::new(), ImageServerConfig::default());
        let source = Arc::new(ImageSource::new(
            "junk",
            MemorySource::new(b"definitely not an image".to_vec()),
        ));

        let err = service
            .render(source, RequestSpec::new("junk", "jpg"), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Decode(DecodeError::NotDecodable { .. })
        ));
        assert!(err.is_source_unavailable());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let decoder = StubDecoder::new();
        let calls = Arc::clone(&decoder.calls);
        let service = ImageService::new(decoder, ImageServerConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .render(stub_source(), RequestSpec::new("stub", "png"), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_decode() {
        let cancel = CancellationToken::new();
        let decoder = StubDecoder {
            calls: Arc::new(AtomicUsize::new(0)),
            cancel_on_decode: Some(cancel.clone()),
        };
        let service = ImageService::new(decoder, ImageServerConfig::default());

        let err = service
            .render(stub_source(), RequestSpec::new("stub", "png"), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { ref id } if id == "stub"));
    }
}
