//! Environment cubemaps: equirectangular image to cube faces with a box
//! filtered mip chain, uploaded as `Rgba16Float`.

use glam::Vec3;
use half::f16;
use image::{ImageReader, Rgba32FImage};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use wgpu::util::DeviceExt;

pub(super) const FACE_SIZE: u32 = 256;

/// Extensions tried, in order, next to an environment path whose own
/// format is not decodable.
const IMAGE_EXTENSIONS: [&str; 4] = ["hdr", "exr", "png", "jpg"];

/// Six square faces per mip level, ordered +X, -X, +Y, -Y, +Z, -Z.
#[derive(Debug, Clone)]
pub(super) struct CubeFaces {
    pub size: u32,
    /// `levels[mip][face]` holds `size >> mip` squared texels.
    pub levels: Vec<[Vec<[f32; 4]>; 6]>,
}

impl CubeFaces {
    pub fn from_fn(size: u32, sample: impl Fn(Vec3) -> [f32; 4]) -> Self {
        let faces = std::array::from_fn(|face| {
            let mut texels = Vec::with_capacity((size * size) as usize);
            for y in 0..size {
                for x in 0..size {
                    let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                    let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                    texels.push(sample(face_direction(face, u, v)));
                }
            }
            texels
        });
        let mut cube = Self {
            size,
            levels: vec![faces],
        };
        cube.build_mips();
        cube
    }

    fn build_mips(&mut self) {
        let mut size = self.size;
        while size > 1 {
            let next = size / 2;
            let Some(previous) = self.levels.last() else {
                return;
            };
            let level = std::array::from_fn(|face| downsample(&previous[face], size, next));
            self.levels.push(level);
            size = next;
        }
    }

    pub fn mip_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Texels as half floats, each face's whole mip chain together.
    pub fn layer_major_bytes(&self) -> Vec<f16> {
        let mut data = Vec::new();
        for face in 0..6 {
            for level in &self.levels {
                for texel in &level[face] {
                    data.extend(texel.iter().map(|channel| f16::from_f32(*channel)));
                }
            }
        }
        data
    }
}

fn downsample(texels: &[[f32; 4]], size: u32, next: u32) -> Vec<[f32; 4]> {
    let size = size as usize;
    let mut out = Vec::with_capacity((next * next) as usize);
    for y in 0..next as usize {
        for x in 0..next as usize {
            let mut sum = [0.0f32; 4];
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let texel = texels[(y * 2 + dy) * size + x * 2 + dx];
                for channel in 0..4 {
                    sum[channel] += texel[channel] * 0.25;
                }
            }
            out.push(sum);
        }
    }
    out
}

/// World direction through `(u, v)` in -1..1 on `face`, with v growing
/// downward as in texture rows.
pub(super) fn face_direction(face: usize, u: f32, v: f32) -> Vec3 {
    let direction = match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    };
    direction.normalize()
}

fn equirect_sample(image: &Rgba32FImage, direction: Vec3) -> [f32; 4] {
    let (width, height) = image.dimensions();
    let u = (direction.z.atan2(direction.x) + PI) / (2.0 * PI);
    let v = direction.y.clamp(-1.0, 1.0).acos() / PI;
    let x = ((u * width as f32) as u32).min(width - 1);
    let y = ((v * height as f32) as u32).min(height - 1);
    let pixel = image.get_pixel(x, y).0;
    [pixel[0], pixel[1], pixel[2], 1.0]
}

fn decode(path: &Path) -> Result<Rgba32FImage, image::ImageError> {
    Ok(ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?
        .to_rgba32f())
}

fn candidates(path: &Path) -> Vec<PathBuf> {
    let mut paths = vec![path.to_path_buf()];
    paths.extend(
        IMAGE_EXTENSIONS
            .iter()
            .map(|extension| path.with_extension(extension)),
    );
    paths
}

/// Sky colors for environments without a decodable image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct SkyPalette {
    pub zenith: Vec3,
    pub horizon: Vec3,
    pub ground: Vec3,
}

impl SkyPalette {
    pub fn for_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_lowercase();
        match stem.as_str() {
            "night" => Self {
                zenith: Vec3::new(0.01, 0.01, 0.04),
                horizon: Vec3::new(0.05, 0.05, 0.12),
                ground: Vec3::new(0.02, 0.02, 0.02),
            },
            "studio" => Self {
                zenith: Vec3::splat(0.9),
                horizon: Vec3::splat(0.6),
                ground: Vec3::splat(0.3),
            },
            "road" => Self {
                zenith: Vec3::new(0.25, 0.45, 0.85),
                horizon: Vec3::new(0.8, 0.85, 0.9),
                ground: Vec3::new(0.25, 0.22, 0.2),
            },
            _ => Self {
                zenith: Vec3::splat(0.5),
                horizon: Vec3::splat(0.4),
                ground: Vec3::splat(0.2),
            },
        }
    }

    pub fn sample(&self, direction: Vec3) -> [f32; 4] {
        let color = if direction.y >= 0.0 {
            self.horizon.lerp(self.zenith, direction.y.sqrt())
        } else {
            self.horizon.lerp(self.ground, (-direction.y * 4.0).min(1.0))
        };
        color.extend(1.0).to_array()
    }
}

/// Cube for the environment at `path`. Falls back to a sky gradient chosen
/// by the file stem when no candidate image decodes.
pub(super) fn load_cube(path: &Path) -> CubeFaces {
    for candidate in candidates(path) {
        if !candidate.is_file() {
            continue;
        }
        match decode(&candidate) {
            Ok(image) if image.width() > 0 && image.height() > 0 => {
                log::info!("Loaded environment {}", candidate.display());
                return CubeFaces::from_fn(FACE_SIZE, |direction| {
                    equirect_sample(&image, direction)
                });
            }
            Ok(_) => {}
            Err(err) => log::debug!("Environment {} not decodable: {}", candidate.display(), err),
        }
    }
    log::warn!(
        "No decodable environment image for {}; using a sky gradient",
        path.display()
    );
    let palette = SkyPalette::for_path(path);
    CubeFaces::from_fn(FACE_SIZE, |direction| palette.sample(direction))
}

pub(super) struct GpuEnvironment {
    pub view: wgpu::TextureView,
    pub mip_count: u32,
}

impl GpuEnvironment {
    pub fn upload(device: &wgpu::Device, queue: &wgpu::Queue, cube: &CubeFaces, label: &str) -> Self {
        let data = cube.layer_major_bytes();
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: cube.size,
                    height: cube.size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: cube.mip_count(),
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba16Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            bytemuck::cast_slice(&data),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Self {
            view,
            mip_count: cube.mip_count(),
        }
    }

    /// Black 1x1 cube bound when the frame has no environment.
    pub fn empty(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let cube = CubeFaces::from_fn(1, |_| [0.0, 0.0, 0.0, 1.0]);
        Self::upload(device, queue, &cube, "empty_environment")
    }
}
