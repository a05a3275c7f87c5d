use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::compute::{AccumulationBuffer, PIXEL_SIZE};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to map accumulation buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("Device lost while reading back the accumulation buffer")]
    DeviceLost,

    #[error("Failed to save {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Same curve as the present shader: Reinhard then gamma 2.2.
fn tone_map(channel: f32) -> u8 {
    let mapped = channel.max(0.0) / (1.0 + channel.max(0.0));
    (mapped.powf(1.0 / 2.2) * 255.0).round() as u8
}

fn convert_rgba(color: [f32; 4]) -> [u8; 4] {
    [tone_map(color[0]), tone_map(color[1]), tone_map(color[2]), 255]
}

/// Build an image from row-major accumulated pixels.
pub fn to_image(pixels: &[[f32; 4]], width: u32, height: u32) -> RgbaImage {
    let mut img = RgbaImage::new(width, height);
    for (index, pixel) in pixels.iter().enumerate().take((width * height) as usize) {
        let x = index as u32 % width;
        let y = index as u32 / width;
        img.put_pixel(x, y, Rgba(convert_rgba(*pixel)));
    }
    img
}

/// Copy the accumulation buffer to the host. Blocks until the GPU is done.
pub fn read_back(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    accumulation: &AccumulationBuffer,
) -> Result<Vec<[f32; 4]>, SnapshotError> {
    let (width, height) = accumulation.size();
    let size = width as u64 * height as u64 * PIXEL_SIZE;
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Snapshot Staging Buffer"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Snapshot Encoder"),
    });
    encoder.copy_buffer_to_buffer(accumulation.buffer(), 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    receiver.recv().map_err(|_| SnapshotError::DeviceLost)??;

    let pixels = bytemuck::cast_slice::<u8, [f32; 4]>(&slice.get_mapped_range()).to_vec();
    staging.unmap();
    Ok(pixels)
}

pub fn save(img: &RgbaImage, path: &Path) -> Result<(), SnapshotError> {
    img.save(path).map_err(|source| SnapshotError::Save {
        path: path.to_owned(),
        source,
    })?;
    tracing::info!(path = %path.display(), "snapshot saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_and_bright_pixels() {
        assert_eq!(convert_rgba([0.0; 4]), [0, 0, 0, 255]);
        assert_eq!(convert_rgba([-3.0, 0.0, 0.0, 1.0]), [0, 0, 0, 255]);
        // Reinhard maps 1.0 to one half.
        assert_eq!(tone_map(1.0), (0.5f32.powf(1.0 / 2.2) * 255.0).round() as u8);
        assert!(tone_map(1.0e6) >= 254);
    }

    #[test]
    fn image_is_row_major() {
        let pixels = [[0.0; 4], [1.0e6; 4], [0.0; 4], [0.0; 4], [0.0; 4], [1.0e6; 4]];
        let img = to_image(&pixels, 3, 2);
        assert_eq!(img.dimensions(), (3, 2));
        assert!(img.get_pixel(1, 0)[0] >= 254);
        assert!(img.get_pixel(2, 1)[0] >= 254);
        assert_eq!(img.get_pixel(0, 1)[0], 0);
    }

    #[test]
    fn save_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.png");
        save(&to_image(&[[0.5; 4]; 4], 2, 2), &path).unwrap();
        assert!(path.exists());
    }
}
