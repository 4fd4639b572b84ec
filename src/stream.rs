// src/stream.rs

/*
 * Bounded-memory streaming framework: applies a per-line binary
 * operator between an in-memory image and a second image of identical
 * geometry read incrementally from storage. The file is always read
 * forward; when the source stores rows bottom-to-top the in-memory row
 * index walks backward to stay aligned.
 */

use crate::cv::{apply_rows, color, PixelOp};
use crate::{Error, Image, PixelFormat, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, trace};

/// Default row-chunk scratch budget in bytes.
pub const DEFAULT_SCRATCH_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourcePixels {
    Gray8,
    Rgb888,
    Bgr888,
}

struct RasterHeader {
    width: u32,
    height: u32,
    pixels: SourcePixels,
    /// Rows are stored bottom-to-top (BMP default).
    bottom_up: bool,
    /// Stored bytes per row, including any alignment padding.
    row_bytes: usize,
}

// One whitespace-separated PNM integer token; '#' starts a comment that
// runs to end of line.
fn read_pnm_int(r: &mut impl Read) -> Result<u32> {
    let mut byte = [0u8; 1];
    // skip whitespace and comments
    loop {
        r.read_exact(&mut byte)?;
        match byte[0] {
            b' ' | b'\t' | b'\r' | b'\n' => continue,
            b'#' => {
                while byte[0] != b'\n' {
                    r.read_exact(&mut byte)?;
                }
            }
            b'0'..=b'9' => break,
            _ => return Err(Error::UnsupportedFormat("malformed header token")),
        }
    }
    let mut value = (byte[0] - b'0') as u32;
    loop {
        match r.read_exact(&mut byte) {
            Ok(()) => {}
            Err(_) => break, // EOF terminates the last token
        }
        match byte[0] {
            b'0'..=b'9' => {
                value = value * 10 + (byte[0] - b'0') as u32;
                if value > 1 << 24 {
                    return Err(Error::UnsupportedFormat("implausible raster dimension"));
                }
            }
            _ => break, // the single whitespace after the token
        }
    }
    Ok(value)
}

fn parse_pnm(r: &mut impl Read, color: bool) -> Result<RasterHeader> {
    let width = read_pnm_int(r)?;
    let height = read_pnm_int(r)?;
    let maxval = read_pnm_int(r)?;
    if width == 0 || height == 0 {
        return Err(Error::UnsupportedFormat("zero raster dimension"));
    }
    if maxval != 255 {
        return Err(Error::UnsupportedFormat("only 8-bit channels supported"));
    }
    let (pixels, row_bytes) = if color {
        (SourcePixels::Rgb888, width as usize * 3)
    } else {
        (SourcePixels::Gray8, width as usize)
    };
    Ok(RasterHeader {
        width,
        height,
        pixels,
        bottom_up: false,
        row_bytes,
    })
}

fn parse_bmp(r: &mut impl Read) -> Result<RasterHeader> {
    // The two magic bytes are already consumed; the rest of the
    // file + info headers is 52 bytes.
    let mut hdr = [0u8; 52];
    r.read_exact(&mut hdr)?;

    let data_offset = u32::from_le_bytes([hdr[8], hdr[9], hdr[10], hdr[11]]);
    let width = i32::from_le_bytes([hdr[16], hdr[17], hdr[18], hdr[19]]);
    let height = i32::from_le_bytes([hdr[20], hdr[21], hdr[22], hdr[23]]);
    let bit_count = u16::from_le_bytes([hdr[26], hdr[27]]);
    let compression = u32::from_le_bytes([hdr[28], hdr[29], hdr[30], hdr[31]]);

    if compression != 0 {
        return Err(Error::UnsupportedFormat("compressed bitmap"));
    }
    if width <= 0 || height == 0 {
        return Err(Error::UnsupportedFormat("zero raster dimension"));
    }

    let (pixels, bytes_pp) = match bit_count {
        8 => (SourcePixels::Gray8, 1usize),
        24 => (SourcePixels::Bgr888, 3usize),
        _ => return Err(Error::UnsupportedFormat("unsupported bit depth")),
    };

    // Negative height is the top-down flip flag.
    let (h, bottom_up) = if height < 0 {
        (-height as u32, false)
    } else {
        (height as u32, true)
    };
    // BMP rows are padded to 4-byte boundaries.
    let row_bytes = (width as usize * bytes_pp + 3) & !3;

    // Skip the palette (and any other gap) up to the pixel data.
    if data_offset > 54 {
        let skip = (data_offset - 54) as u64;
        std::io::copy(&mut r.take(skip), &mut std::io::sink())?;
    }

    Ok(RasterHeader {
        width: width as u32,
        height: h,
        pixels,
        bottom_up,
        row_bytes,
    })
}

fn parse_header(r: &mut impl Read) -> Result<RasterHeader> {
    let mut magic = [0u8; 2];
    r.read_exact(&mut magic)?;
    let parsed = match &magic {
        b"P5" => parse_pnm(r, false),
        b"P6" => parse_pnm(r, true),
        b"BM" => parse_bmp(r),
        _ => Err(Error::UnsupportedFormat("unknown magic")),
    };
    // A file that ends inside its own header is malformed, not an I/O
    // failure of the storage layer.
    parsed.map_err(|e| match e {
        Error::Io(ioe) if ioe.kind() == std::io::ErrorKind::UnexpectedEof => {
            Error::UnsupportedFormat("truncated header")
        }
        other => other,
    })
}

// Converts one stored row to the in-memory image's pixel format.
fn convert_row(pixels: SourcePixels, src: &[u8], format: PixelFormat, out: &mut [u8]) {
    match (pixels, format) {
        (SourcePixels::Gray8, PixelFormat::Grayscale) => {
            out.copy_from_slice(&src[..out.len()]);
        }
        (SourcePixels::Gray8, PixelFormat::Rgb565) => {
            for (i, px) in out.chunks_exact_mut(2).enumerate() {
                let v = src[i];
                px.copy_from_slice(&color::rgb888_to_rgb565(v, v, v).to_le_bytes());
            }
        }
        (SourcePixels::Rgb888, PixelFormat::Grayscale) => {
            for (i, px) in out.iter_mut().enumerate() {
                let s = &src[i * 3..i * 3 + 3];
                *px = color::rgb_to_grayscale(s[0], s[1], s[2]);
            }
        }
        (SourcePixels::Rgb888, PixelFormat::Rgb565) => {
            for (i, px) in out.chunks_exact_mut(2).enumerate() {
                let s = &src[i * 3..i * 3 + 3];
                px.copy_from_slice(&color::rgb888_to_rgb565(s[0], s[1], s[2]).to_le_bytes());
            }
        }
        (SourcePixels::Bgr888, PixelFormat::Grayscale) => {
            for (i, px) in out.iter_mut().enumerate() {
                let s = &src[i * 3..i * 3 + 3];
                *px = color::rgb_to_grayscale(s[2], s[1], s[0]);
            }
        }
        (SourcePixels::Bgr888, PixelFormat::Rgb565) => {
            for (i, px) in out.chunks_exact_mut(2).enumerate() {
                let s = &src[i * 3..i * 3 + 3];
                px.copy_from_slice(&color::rgb888_to_rgb565(s[2], s[1], s[0]).to_le_bytes());
            }
        }
    }
}

/// Applies `op` between `img` and the raster file at `path`, reading the
/// file sequentially in chunks of whole rows sized to `scratch_budget`
/// bytes (minimum one row), so the second operand never has to fit in
/// memory.
///
/// Header geometry is checked against `img` before any pixel is
/// touched; a bad magic or malformed header surfaces as
/// [`Error::UnsupportedFormat`].
pub fn stream_op(op: PixelOp, img: &mut Image, path: &Path, scratch_budget: usize) -> Result<()> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let header = parse_header(&mut reader)?;

    if header.width != img.width() || header.height != img.height() {
        return Err(Error::GeometryMismatch(
            img.width(),
            img.height(),
            header.width,
            header.height,
        ));
    }

    let rows_per_chunk = (scratch_budget / header.row_bytes).max(1);
    let mut scratch = vec![0u8; rows_per_chunk * header.row_bytes];
    let mut converted = vec![0u8; img.stride()];
    debug!(
        rows_per_chunk,
        bottom_up = header.bottom_up,
        "streaming operator started"
    );

    let mut rows_done = 0u32;
    while rows_done < header.height {
        let n = (header.height - rows_done).min(rows_per_chunk as u32);
        let chunk = &mut scratch[..n as usize * header.row_bytes];
        reader.read_exact(chunk)?;

        for r in 0..n {
            let stored_row = rows_done + r;
            let img_row = if header.bottom_up {
                header.height - 1 - stored_row
            } else {
                stored_row
            };
            let src = &chunk[r as usize * header.row_bytes..][..header.row_bytes];
            convert_row(header.pixels, src, img.format(), &mut converted);
            apply_rows(op, img.format(), img.row_mut(img_row), &converted);
        }
        rows_done += n;
        trace!(rows_done, "chunk applied");
    }

    Ok(())
}

/// [`stream_op`] with the default scratch budget.
pub fn stream_op_default(op: PixelOp, img: &mut Image, path: &Path) -> Result<()> {
    stream_op(op, img, path, DEFAULT_SCRATCH_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::binary::binary_op;
    use std::io::Write;

    fn test_pattern(w: u32, h: u32) -> Vec<u8> {
        (0..w * h).map(|i| (i * 31 % 256) as u8).collect()
    }

    fn write_pgm(dir: &std::path::Path, name: &str, w: u32, h: u32, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        write!(f, "P5\n{w} {h}\n255\n").unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn test_stream_xor_self_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let data = test_pattern(13, 9);
        let path = write_pgm(dir.path(), "a.pgm", 13, 9, &data);

        let mut buf = data.clone();
        let mut img = Image::new(&mut buf, 13, 9, PixelFormat::Grayscale).unwrap();
        stream_op(PixelOp::Xor, &mut img, &path, 7).unwrap();
        assert!(img.bytes().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_stream_matches_in_memory_path() {
        let dir = tempfile::tempdir().unwrap();
        let a = test_pattern(16, 8);
        let b: Vec<u8> = a.iter().map(|v| v.wrapping_mul(7)).collect();
        let path = write_pgm(dir.path(), "b.pgm", 16, 8, &b);

        for op in [PixelOp::And, PixelOp::Or, PixelOp::Xor, PixelOp::Difference] {
            let mut streamed = a.clone();
            let mut img = Image::new(&mut streamed, 16, 8, PixelFormat::Grayscale).unwrap();
            stream_op(op, &mut img, &path, DEFAULT_SCRATCH_BYTES).unwrap();

            let mut in_mem = a.clone();
            let mut b_copy = b.clone();
            let mut img_a = Image::new(&mut in_mem, 16, 8, PixelFormat::Grayscale).unwrap();
            let img_b = Image::new(&mut b_copy, 16, 8, PixelFormat::Grayscale).unwrap();
            binary_op(op, &mut img_a, &img_b).unwrap();

            assert_eq!(streamed, in_mem, "{op:?} diverged from in-memory path");
        }
    }

    #[test]
    fn test_bottom_up_bmp() {
        // 24-bit uncompressed BMP, rows stored bottom-to-top with
        // 4-byte row padding.
        let (w, h) = (3u32, 2u32);
        let gray = vec![10u8, 20, 30, 40, 50, 60]; // row 0: 10,20,30
        let row_bytes = (w as usize * 3 + 3) & !3; // 12, no pad here
        let mut file_bytes = Vec::new();
        file_bytes.extend_from_slice(b"BM");
        let file_size = 54 + row_bytes as u32 * h;
        file_bytes.extend_from_slice(&file_size.to_le_bytes());
        file_bytes.extend_from_slice(&0u32.to_le_bytes());
        file_bytes.extend_from_slice(&54u32.to_le_bytes()); // data offset
        file_bytes.extend_from_slice(&40u32.to_le_bytes()); // info header size
        file_bytes.extend_from_slice(&(w as i32).to_le_bytes());
        file_bytes.extend_from_slice(&(h as i32).to_le_bytes()); // positive: bottom-up
        file_bytes.extend_from_slice(&1u16.to_le_bytes()); // planes
        file_bytes.extend_from_slice(&24u16.to_le_bytes()); // bpp
        file_bytes.extend_from_slice(&[0u8; 24]); // compression + tail
        assert_eq!(file_bytes.len(), 54);
        // bottom row first
        for y in (0..h).rev() {
            let mut row = Vec::new();
            for x in 0..w {
                let v = gray[(y * w + x) as usize];
                row.extend_from_slice(&[v, v, v]); // BGR
            }
            row.resize(row_bytes, 0);
            file_bytes.extend_from_slice(&row);
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.bmp");
        std::fs::write(&path, &file_bytes).unwrap();

        let mut buf = gray.clone();
        let mut img = Image::new(&mut buf, w, h, PixelFormat::Grayscale).unwrap();
        stream_op(PixelOp::Xor, &mut img, &path, DEFAULT_SCRATCH_BYTES).unwrap();
        assert!(
            img.bytes().iter().all(|&v| v == 0),
            "bottom-up rows misaligned: {:?}",
            img.bytes()
        );
    }

    #[test]
    fn test_bad_magic_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.raw");
        std::fs::write(&path, b"XYneither").unwrap();

        let mut buf = vec![0u8; 4];
        let mut img = Image::new(&mut buf, 2, 2, PixelFormat::Grayscale).unwrap();
        assert!(matches!(
            stream_op(PixelOp::And, &mut img, &path, 64),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_geometry_mismatch_leaves_image_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let data = test_pattern(4, 4);
        let path = write_pgm(dir.path(), "m.pgm", 4, 4, &data);

        let original = test_pattern(4, 3);
        let mut buf = original.clone();
        let mut img = Image::new(&mut buf, 4, 3, PixelFormat::Grayscale).unwrap();
        assert!(matches!(
            stream_op(PixelOp::Xor, &mut img, &path, 64),
            Err(Error::GeometryMismatch(4, 3, 4, 4))
        ));
        assert_eq!(img.bytes(), &original[..]);
    }

    #[test]
    fn test_ppm_against_rgb565_image() {
        // An RGB565 image xored with the PPM expansion of itself
        // cancels exactly (565 -> 888 -> 565 is lossless).
        let (w, h) = (6u32, 4u32);
        let mut pixels = Vec::new();
        for i in 0..w * h {
            pixels.push((i.wrapping_mul(2654435761) & 0xFFFF) as u16);
        }

        let mut ppm = Vec::new();
        write!(ppm, "P6\n{w} {h}\n255\n").unwrap();
        for &p in &pixels {
            let (r, g, b) = color::rgb565_to_rgb888(p);
            ppm.extend_from_slice(&[r, g, b]);
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.ppm");
        std::fs::write(&path, &ppm).unwrap();

        let mut buf: Vec<u8> = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
        let mut img = Image::new(&mut buf, w, h, PixelFormat::Rgb565).unwrap();
        stream_op(PixelOp::Xor, &mut img, &path, 32).unwrap();
        assert!(img.bytes().iter().all(|&v| v == 0));
    }
}
