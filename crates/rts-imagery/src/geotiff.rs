//! Windowed GeoTIFF reading and writing.
//!
//! Only the chunks (tiles or strips) that intersect the requested window are
//! decoded, which keeps remote reads of cloud-optimized GeoTIFFs small.

use crate::crs::Epsg;
use crate::raster::{Affine, PixelArray, Profile, Samples, Window};
use crate::{ImageryError, Result};
use std::io::{Read, Seek, Write};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tracing::debug;

/// GeoKey holding the model type (projected or geographic).
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
/// GeoKey holding the raster type (pixel is area or point).
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
/// GeoKey holding a geographic CRS code.
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
/// GeoKey holding a projected CRS code.
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
/// GeoKey value meaning "user defined", which has no EPSG code.
const USER_DEFINED: u16 = 32767;
/// `PlanarConfiguration` value for band-separate storage.
const PLANAR_SEPARATE: u32 = 2;

/// A GeoTIFF opened for windowed reads.
pub struct GeoTiffReader<R: Read + Seek> {
    decoder: Decoder<R>,
    profile: Profile,
    planar: bool,
}

impl<R: Read + Seek> std::fmt::Debug for GeoTiffReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffReader")
            .field("profile", &self.profile)
            .field("planar", &self.planar)
            .finish()
    }
}

impl<R: Read + Seek> GeoTiffReader<R> {
    /// Read the header and georeferencing of a GeoTIFF.
    pub fn open(reader: R) -> Result<Self> {
        let mut decoder = Decoder::new(reader)?;

        // Windows are small but offset tables of large mosaics are not
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 512 * 1024 * 1024;
        limits.intermediate_buffer_size = 512 * 1024 * 1024;
        limits.ifd_value_size = 64 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let bands = decoder
            .find_tag(Tag::SamplesPerPixel)?
            .map(|v| v.into_u32())
            .transpose()?
            .unwrap_or(1);
        let planar = decoder
            .find_tag(Tag::PlanarConfiguration)?
            .map(|v| v.into_u32())
            .transpose()?
            == Some(PLANAR_SEPARATE);

        let transform = read_transform(&mut decoder)?;
        let crs = read_crs(&mut decoder)?;
        let nodata = read_nodata(&mut decoder);

        Ok(Self {
            decoder,
            profile: Profile {
                width,
                height,
                bands,
                transform,
                crs,
                nodata,
            },
            planar,
        })
    }

    /// Profile of the full raster.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Decode `window` into a band-major array.
    pub fn read_window(&mut self, window: &Window) -> Result<PixelArray> {
        if window.is_empty() {
            return Err(ImageryError::EmptyWindow(format!("{window:?}")));
        }
        let Profile {
            width,
            height,
            bands,
            ..
        } = self.profile;
        if window.col_off + window.width > width || window.row_off + window.height > height {
            return Err(ImageryError::InvalidGeoTiff(format!(
                "window {window:?} exceeds raster {width}x{height}"
            )));
        }

        let (chunk_width, chunk_height) = self.decoder.chunk_dimensions();
        if chunk_width == 0 || chunk_height == 0 {
            return Err(ImageryError::InvalidGeoTiff("zero chunk dimensions".to_string()));
        }
        let chunks_across = width.div_ceil(chunk_width);
        let chunks_down = height.div_ceil(chunk_height);
        let chunks_per_plane = chunks_across * chunks_down;

        let first_col = window.col_off / chunk_width;
        let last_col = (window.col_off + window.width - 1) / chunk_width;
        let first_row = window.row_off / chunk_height;
        let last_row = (window.row_off + window.height - 1) / chunk_height;

        let planes = if self.planar { bands } else { 1 };
        let samples_per_pixel = if self.planar { 1 } else { bands };
        let total = (bands * window.width * window.height) as usize;
        let mut out: Option<Samples> = None;
        let mut decoded = 0usize;

        for plane in 0..planes {
            for chunk_row in first_row..=last_row {
                for chunk_col in first_col..=last_col {
                    let index = plane * chunks_per_plane + chunk_row * chunks_across + chunk_col;
                    let chunk = self.decoder.read_chunk(index)?;
                    let (data_width, data_height) = self.decoder.chunk_data_dimensions(index);

                    let layout = ChunkLayout {
                        origin_col: chunk_col * chunk_width,
                        origin_row: chunk_row * chunk_height,
                        data_width,
                        data_height,
                        stride: chunk_stride(
                            decoding_len(&chunk),
                            (chunk_width, chunk_height),
                            (data_width, data_height),
                            samples_per_pixel,
                        ),
                        samples_per_pixel,
                        plane: if self.planar { Some(plane) } else { None },
                        window: *window,
                    };

                    if out.is_none() {
                        out = Some(zeroed_like(&chunk, total)?);
                    }
                    if let Some(target) = out.as_mut() {
                        copy_chunk(target, chunk, &layout)?;
                        decoded += 1;
                    }
                }
            }
        }

        debug!("Decoded {} chunk(s) for window {:?}", decoded, window);

        let samples = out.ok_or_else(|| ImageryError::InvalidGeoTiff("no chunks decoded".to_string()))?;
        PixelArray::new(
            bands as usize,
            window.height as usize,
            window.width as usize,
            samples,
        )
    }
}

/// Where a decoded chunk sits in the image and in the output window.
struct ChunkLayout {
    origin_col: u32,
    origin_row: u32,
    data_width: u32,
    data_height: u32,
    /// Pixels per row in the decoded buffer.
    stride: u32,
    samples_per_pixel: u32,
    /// Band held by this chunk when bands are stored separately.
    plane: Option<u32>,
    window: Window,
}

/// Decoders may return edge chunks either padded to the full chunk size or cropped.
fn chunk_stride(len: usize, full: (u32, u32), data: (u32, u32), samples_per_pixel: u32) -> u32 {
    let padded = (full.0 * full.1 * samples_per_pixel) as usize;
    if len == padded && data.0 < full.0 {
        full.0
    } else {
        data.0
    }
}

fn decoding_len(chunk: &DecodingResult) -> usize {
    match chunk {
        DecodingResult::U8(v) => v.len(),
        DecodingResult::U16(v) => v.len(),
        DecodingResult::U32(v) => v.len(),
        DecodingResult::U64(v) => v.len(),
        DecodingResult::F32(v) => v.len(),
        DecodingResult::F64(v) => v.len(),
        DecodingResult::I8(v) => v.len(),
        DecodingResult::I16(v) => v.len(),
        DecodingResult::I32(v) => v.len(),
        DecodingResult::I64(v) => v.len(),
    }
}

fn decoding_type_name(chunk: &DecodingResult) -> &'static str {
    match chunk {
        DecodingResult::U8(_) => "uint8",
        DecodingResult::U16(_) => "uint16",
        DecodingResult::U32(_) => "uint32",
        DecodingResult::U64(_) => "uint64",
        DecodingResult::F32(_) => "float32",
        DecodingResult::F64(_) => "float64",
        DecodingResult::I8(_) => "int8",
        DecodingResult::I16(_) => "int16",
        DecodingResult::I32(_) => "int32",
        DecodingResult::I64(_) => "int64",
    }
}

fn zeroed_like(chunk: &DecodingResult, len: usize) -> Result<Samples> {
    Ok(match chunk {
        DecodingResult::U8(_) => Samples::U8(vec![0; len]),
        DecodingResult::U16(_) => Samples::U16(vec![0; len]),
        DecodingResult::I16(_) => Samples::I16(vec![0; len]),
        DecodingResult::U32(_) => Samples::U32(vec![0; len]),
        DecodingResult::I32(_) => Samples::I32(vec![0; len]),
        DecodingResult::F32(_) => Samples::F32(vec![0.0; len]),
        DecodingResult::F64(_) => Samples::F64(vec![0.0; len]),
        other => {
            return Err(ImageryError::UnsupportedDataType(format!(
                "{} samples",
                decoding_type_name(other)
            )))
        }
    })
}

fn copy_chunk(target: &mut Samples, chunk: DecodingResult, layout: &ChunkLayout) -> Result<()> {
    match (target, chunk) {
        (Samples::U8(dst), DecodingResult::U8(src)) => copy_samples(dst, &src, layout),
        (Samples::U16(dst), DecodingResult::U16(src)) => copy_samples(dst, &src, layout),
        (Samples::I16(dst), DecodingResult::I16(src)) => copy_samples(dst, &src, layout),
        (Samples::U32(dst), DecodingResult::U32(src)) => copy_samples(dst, &src, layout),
        (Samples::I32(dst), DecodingResult::I32(src)) => copy_samples(dst, &src, layout),
        (Samples::F32(dst), DecodingResult::F32(src)) => copy_samples(dst, &src, layout),
        (Samples::F64(dst), DecodingResult::F64(src)) => copy_samples(dst, &src, layout),
        (dst, src) => Err(ImageryError::UnsupportedDataType(format!(
            "chunk of {} in a {} raster",
            decoding_type_name(&src),
            dst.type_name()
        ))),
    }
}

/// Copy the part of a decoded chunk that overlaps the window.
fn copy_samples<T: Copy>(dst: &mut [T], src: &[T], layout: &ChunkLayout) -> Result<()> {
    let spp = layout.samples_per_pixel as usize;
    if layout.data_width == 0 || layout.data_height == 0 {
        return Ok(());
    }
    let required = ((layout.data_height - 1) * layout.stride + layout.data_width) as usize * spp;
    if src.len() < required {
        return Err(ImageryError::InvalidGeoTiff(format!(
            "chunk holds {} samples, expected at least {required}",
            src.len()
        )));
    }

    let w = &layout.window;
    let col_start = layout.origin_col.max(w.col_off);
    let col_stop = (layout.origin_col + layout.data_width).min(w.col_off + w.width);
    let row_start = layout.origin_row.max(w.row_off);
    let row_stop = (layout.origin_row + layout.data_height).min(w.row_off + w.height);
    let plane_len = (w.width * w.height) as usize;

    for row in row_start..row_stop {
        for col in col_start..col_stop {
            let src_px = ((row - layout.origin_row) * layout.stride + (col - layout.origin_col)) as usize;
            let dst_px = ((row - w.row_off) * w.width + (col - w.col_off)) as usize;
            match layout.plane {
                Some(band) => dst[band as usize * plane_len + dst_px] = src[src_px],
                None => {
                    for band in 0..spp {
                        dst[band * plane_len + dst_px] = src[src_px * spp + band];
                    }
                }
            }
        }
    }
    Ok(())
}

/// Affine transform from `ModelTransformationTag`, or tiepoint plus pixel scale.
fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Affine> {
    if let Some(matrix) = decoder.find_tag(Tag::ModelTransformationTag)? {
        let m = matrix.into_f64_vec()?;
        if m.len() >= 8 {
            return Ok(Affine {
                a: m[0],
                b: m[1],
                c: m[3],
                d: m[4],
                e: m[5],
                f: m[7],
            });
        }
    }

    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;

    match (tiepoint, scale) {
        (Some(tie), Some(scale)) if tie.len() >= 6 && scale.len() >= 2 => {
            // Tiepoint format: [i, j, k, x, y, z] maps pixel (i, j) to model (x, y)
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            Ok(Affine {
                a: scale[0],
                b: 0.0,
                c: x - i * scale[0],
                d: 0.0,
                e: -scale[1],
                f: y + j * scale[1],
            })
        }
        _ => Err(ImageryError::InvalidGeoTiff(
            "missing ModelTransformation or ModelTiepoint/ModelPixelScale tags".to_string(),
        )),
    }
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<Epsg>> {
    let Some(keys) = decoder.find_tag(Tag::GeoKeyDirectoryTag)? else {
        return Ok(None);
    };
    Ok(crs_from_geokeys(&keys.into_u16_vec()?))
}

/// Extract the EPSG code from a GeoKey directory.
///
/// The directory is a header `[version, revision, minor, count]` followed by
/// `count` entries of `[key, location, count, value]`. Only inline values are
/// consulted; a projected code takes precedence over a geographic one.
pub fn crs_from_geokeys(keys: &[u16]) -> Option<Epsg> {
    let count = *keys.get(3)? as usize;
    let mut projected = None;
    let mut geographic = None;
    for entry in keys.get(4..)?.chunks_exact(4).take(count) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_GEO_KEY => projected = Some(Epsg(value as u32)),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(Epsg(value as u32)),
            _ => {}
        }
    }
    projected.or(geographic)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok())
}

/// GeoKey directory declaring `crs` with pixel-is-area semantics.
pub fn geokeys_for(crs: Epsg) -> Vec<u16> {
    let (model_type, crs_key) = if crs.is_geographic() {
        (2, GEOGRAPHIC_TYPE_GEO_KEY)
    } else {
        (1, PROJECTED_CS_TYPE_GEO_KEY)
    };
    let code = u16::try_from(crs.code()).unwrap_or(USER_DEFINED);
    vec![
        1, 1, 0, 3, //
        GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type, //
        GT_RASTER_TYPE_GEO_KEY, 0, 1, 1, //
        crs_key, 0, 1, code,
    ]
}

/// Write `pixels` as a GeoTIFF with `profile`'s georeferencing.
///
/// Supports 1, 3 or 4 bands of `uint8`, `uint16` or `float32`.
pub fn write_geotiff<W: Write + Seek>(writer: W, pixels: &PixelArray, profile: &Profile) -> Result<()> {
    let (bands, height, width) = pixels.shape();
    let mut encoder = TiffEncoder::new(writer)?;
    let (w, h) = (width as u32, height as u32);

    match (bands, pixels.samples()) {
        (1, Samples::U8(v)) => write_image::<_, colortype::Gray8>(&mut encoder, w, h, &interleave(v, bands), profile),
        (1, Samples::U16(v)) => write_image::<_, colortype::Gray16>(&mut encoder, w, h, &interleave(v, bands), profile),
        (1, Samples::F32(v)) => {
            write_image::<_, colortype::Gray32Float>(&mut encoder, w, h, &interleave(v, bands), profile)
        }
        (3, Samples::U8(v)) => write_image::<_, colortype::RGB8>(&mut encoder, w, h, &interleave(v, bands), profile),
        (3, Samples::U16(v)) => write_image::<_, colortype::RGB16>(&mut encoder, w, h, &interleave(v, bands), profile),
        (3, Samples::F32(v)) => {
            write_image::<_, colortype::RGB32Float>(&mut encoder, w, h, &interleave(v, bands), profile)
        }
        (4, Samples::U8(v)) => write_image::<_, colortype::RGBA8>(&mut encoder, w, h, &interleave(v, bands), profile),
        (4, Samples::U16(v)) => {
            write_image::<_, colortype::RGBA16>(&mut encoder, w, h, &interleave(v, bands), profile)
        }
        (4, Samples::F32(v)) => {
            write_image::<_, colortype::RGBA32Float>(&mut encoder, w, h, &interleave(v, bands), profile)
        }
        (bands, samples) => Err(ImageryError::UnsupportedDataType(format!(
            "cannot write {bands} band(s) of {}",
            samples.type_name()
        ))),
    }
}

fn write_image<W, C>(
    encoder: &mut TiffEncoder<W>,
    width: u32,
    height: u32,
    data: &[C::Inner],
    profile: &Profile,
) -> Result<()>
where
    W: Write + Seek,
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let mut image = encoder.new_image::<C>(width, height)?;
    let dir = image.encoder();

    let t = &profile.transform;
    if t.is_rectilinear() {
        let scale = [t.a, -t.e, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, t.c, t.f, 0.0];
        dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
        dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    } else {
        let matrix = [
            t.a, t.b, 0.0, t.c, //
            t.d, t.e, 0.0, t.f, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::ModelTransformationTag, &matrix[..])?;
    }
    if let Some(crs) = profile.crs {
        dir.write_tag(Tag::GeoKeyDirectoryTag, &geokeys_for(crs)[..])?;
    }
    if let Some(nodata) = profile.nodata {
        dir.write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
    }

    image.write_data(data)?;
    Ok(())
}

/// Band-major to pixel-interleaved.
fn interleave<T: Copy>(band_major: &[T], bands: usize) -> Vec<T> {
    if bands <= 1 {
        return band_major.to_vec();
    }
    let plane = band_major.len() / bands;
    (0..plane)
        .flat_map(|px| (0..bands).map(move |band| band_major[band * plane + px]))
        .collect()
}
