//! Multi-page 16-bit grayscale TIFF output, one page per frame.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use labcam::Frame;
use tiff::encoder::{colortype, TiffEncoder, TiffKind};
use tracing::info;

/// Write `frames` in order to `path`. `big` selects the BigTIFF container.
pub fn write_stack(path: &Path, frames: &[Frame], big: bool) -> Result<()> {
    let Some(first) = frames.first() else {
        bail!("cannot write an empty frame stack");
    };
    for (index, frame) in frames.iter().enumerate() {
        if (frame.width, frame.height) != (first.width, first.height) {
            bail!(
                "frame {index} is {}x{}, expected {}x{}",
                frame.width,
                frame.height,
                first.width,
                first.height
            );
        }
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let writer = BufWriter::new(file);
    if big {
        let encoder = TiffEncoder::new_big(writer).context("start BigTIFF stream")?;
        write_pages(encoder, frames)?;
    } else {
        let encoder = TiffEncoder::new(writer).context("start TIFF stream")?;
        write_pages(encoder, frames)?;
    }
    info!(
        file = %path.display(),
        pages = frames.len(),
        width = first.width,
        height = first.height,
        "wrote TIFF stack"
    );
    Ok(())
}

fn write_pages<W: Write + Seek, K: TiffKind>(
    mut encoder: TiffEncoder<W, K>,
    frames: &[Frame],
) -> Result<()> {
    for (index, frame) in frames.iter().enumerate() {
        let pixels = frame.to_pixels();
        encoder
            .write_image::<colortype::Gray16>(frame.width, frame.height, &pixels)
            .with_context(|| format!("encode page {index}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use labcam::Roi;
    use std::time::Instant;
    use tiff::decoder::{Decoder, DecodingResult};

    fn frame(count: u64, width: u32, height: u32) -> Frame {
        let pixels: Vec<u8> = (0..width * height)
            .flat_map(|i| (i as u16 + count as u16).to_le_bytes())
            .collect();
        Frame {
            data: pixels.into(),
            width,
            height,
            frame_count: count,
            fps: 0.0,
            roi: Roi::new(0, 0, width, height),
            binning: 1,
            timestamp: Instant::now(),
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("labcamctl-{}-{name}.tiff", std::process::id()))
    }

    #[test]
    fn pages_keep_acquisition_order() {
        for big in [false, true] {
            let path = temp_path(if big { "big" } else { "classic" });
            let frames: Vec<Frame> = (1..=3).map(|n| frame(n, 4, 2)).collect();
            write_stack(&path, &frames, big).expect("write stack");

            let mut decoder = Decoder::new(File::open(&path).unwrap()).expect("decoder");
            for expected in &frames {
                assert_eq!(decoder.dimensions().unwrap(), (4, 2));
                match decoder.read_image().unwrap() {
                    DecodingResult::U16(pixels) => assert_eq!(pixels, expected.to_pixels()),
                    _ => panic!("expected 16-bit pixels"),
                }
                if expected.frame_count < 3 {
                    decoder.next_image().unwrap();
                }
            }
            assert!(!decoder.more_images());
            std::fs::remove_file(&path).ok();
        }
    }

    #[test]
    fn mismatched_or_empty_stacks_are_rejected() {
        let path = temp_path("bad");
        assert!(write_stack(&path, &[], false).is_err());
        let frames = [frame(1, 4, 2), frame(2, 8, 2)];
        assert!(write_stack(&path, &frames, false).is_err());
        std::fs::remove_file(&path).ok();
    }
}
