// Still-image loading (standard + RAW) and animated-container probing.

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, Frame, ImageReader, ImageResult, RgbImage};
use std::fs;
use std::io::BufReader;
use std::path::Path;

use crate::error::MediaError;
use crate::formats::extension_of;

/// Loads a still image as 8-bit RGB.
///
/// Grayscale, alpha and high bit-depth buffers are converted; any color
/// layout the converter does not know is rejected as `UnsupportedColorMode`.
/// Formats without a magic signature (TGA) are decoded by extension.
pub fn load_rgb(path: &Path) -> Result<RgbImage, MediaError> {
    let img = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| MediaError::io(path, e))?
        .decode()
        .map_err(|e| MediaError::decode(path, e))?;
    into_rgb(path, img)
}

fn into_rgb(path: &Path, img: DynamicImage) -> Result<RgbImage, MediaError> {
    match img {
        DynamicImage::ImageRgb8(buf) => Ok(buf),
        DynamicImage::ImageRgba8(_)
        | DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb32F(_)
        | DynamicImage::ImageRgba32F(_) => Ok(img.to_rgb8()),
        other => Err(MediaError::UnsupportedColorMode {
            path: path.to_path_buf(),
            mode: format!("{:?}", other.color()),
        }),
    }
}

/// Demosaics a camera RAW file with the camera's white balance and returns
/// the 8-bit RGB raster. The LibRaw handle is released when `raw` drops,
/// on success and on every error return.
pub fn load_raw(path: &Path) -> Result<RgbImage, MediaError> {
    let data = fs::read(path).map_err(|e| MediaError::io(path, e))?;
    let raw_err = |stage| MediaError::Raw { path: path.to_path_buf(), stage };

    let mut raw = rsraw::RawImage::open(&data).map_err(|_| raw_err("open"))?;
    raw.set_use_camera_wb(true);
    raw.unpack().map_err(|_| raw_err("unpack"))?;
    let processed = raw.process::<{ rsraw::BIT_DEPTH_8 }>().map_err(|_| raw_err("postprocess"))?;

    let w = processed.width() as u32;
    let h = processed.height() as u32;
    if processed.len() != (w as usize) * (h as usize) * 3 {
        return Err(raw_err("postprocess"));
    }
    log::debug!("[RAW] {:?} -> {}x{}", path.file_name().unwrap_or_default(), w, h);
    RgbImage::from_raw(w, h, processed.to_vec()).ok_or_else(|| raw_err("postprocess"))
}

/// Opens an animated container and returns its frame decoder.
///
/// GIF, APNG and WebP are decoded in-process; anything else has no probe.
pub fn open_animation(path: &Path) -> Result<Box<dyn Iterator<Item = ImageResult<Frame>>>, MediaError> {
    let file = fs::File::open(path).map_err(|e| MediaError::io(path, e))?;
    let reader = BufReader::new(file);
    let ext = extension_of(path);
    let frames = match ext.as_str() {
        "gif" => {
            let dec = GifDecoder::new(reader).map_err(|e| MediaError::decode(path, e))?;
            dec.into_frames().into_iter()
        }
        "webp" => {
            let dec = WebPDecoder::new(reader).map_err(|e| MediaError::decode(path, e))?;
            dec.into_frames().into_iter()
        }
        "png" | "apng" => {
            let dec = PngDecoder::new(reader).map_err(|e| MediaError::decode(path, e))?;
            let apng = dec.apng().map_err(|e| MediaError::decode(path, e))?;
            apng.into_frames().into_iter()
        }
        _ => return Err(MediaError::NoProbe { path: path.to_path_buf() }),
    };
    Ok(Box::new(frames))
}

/// Answers whether an ambiguous container holds more than one frame.
///
/// The container's own animation flag is consulted first; when it claims
/// animation (or has no such flag) the frames are walked until a second one
/// decodes.
pub fn has_multiple_frames(path: &Path) -> Result<bool, MediaError> {
    let ext = extension_of(path);
    let file = fs::File::open(path).map_err(|e| MediaError::io(path, e))?;
    let reader = BufReader::new(file);

    match ext.as_str() {
        "webp" => {
            let dec = WebPDecoder::new(reader).map_err(|e| MediaError::decode(path, e))?;
            if !dec.has_animation() {
                return Ok(false);
            }
        }
        "png" | "apng" => {
            let dec = PngDecoder::new(reader).map_err(|e| MediaError::decode(path, e))?;
            if !dec.is_apng().map_err(|e| MediaError::decode(path, e))? {
                return Ok(false);
            }
        }
        "gif" => {}
        _ => return Err(MediaError::NoProbe { path: path.to_path_buf() }),
    }

    let frames = open_animation(path)?;
    let decoded = frames.take(2).take_while(|f| f.is_ok()).count();
    Ok(decoded > 1)
}

/// Counts decodable frames of an animated container.
pub fn count_frames(path: &Path) -> Result<usize, MediaError> {
    let frames = open_animation(path)?;
    Ok(frames.take_while(|f| f.is_ok()).count())
}
