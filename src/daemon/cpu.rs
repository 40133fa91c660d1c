use std::path::{Path, PathBuf};

use anyhow::Context as _;
use glam::{Quat, Vec2, Vec3};

use crate::daemon::{RenderEngine, RenderJob};
use crate::foundation::error::{SwatchError, SwatchResult};
use crate::ipc::wire::{CameraConfig, PreviewModel, Primitive};


const VIEW_EXTENT: f32 = 1.35;
const BOX_HALF: f32 = 0.8;
const CYLINDER_RADIUS: f32 = 0.8;
const CYLINDER_HALF_HEIGHT: f32 = 1.0;
const AMBIENT: f32 = 0.08;

/// Software preview engine: shades an analytic primitive with the requested material.
///
/// Orthographic camera looking at the origin from the configured position, Z up, one
/// directional key light rotated about X by the configured angle. Imported model assets are
/// previewed on a sphere.
#[derive(Clone, Debug)]
pub struct CpuPreviewEngine {
    /// Straight RGB background.
    pub background: [u8; 3],
}

impl Default for CpuPreviewEngine {
    fn default() -> Self {
        Self {
            background: [38, 40, 46],
        }
    }
}

impl RenderEngine for CpuPreviewEngine {
    fn render(&mut self, job: &RenderJob, out: &Path) -> SwatchResult<()> {
        let img = self.shade(job)?;
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        img.save_with_format(out, image::ImageFormat::Png)
            .map_err(|e| SwatchError::engine(format!("write '{}': {e}", out.display())))?;
        Ok(())
    }
}

struct Hit {
    normal: Vec3,
    uv: Vec2,
}

struct Textures {
    albedo: Option<image::RgbImage>,
    metalness: Option<image::RgbImage>,
}

impl CpuPreviewEngine {
    /// Render `job` into an RGB image without touching the file system (textures aside).
    pub fn shade(&self, job: &RenderJob) -> SwatchResult<image::RgbImage> {
        let (w, h) = (job.resolution.width, job.resolution.height);
        if w == 0 || h == 0 {
            return Err(SwatchError::engine("output resolution must be non-zero"));
        }

        let primitive = match &job.scene.model {
            PreviewModel::Primitive(p) => *p,
            PreviewModel::Asset(name) => {
                tracing::debug!(asset = %name, "software engine previews imported assets on a sphere");
                Primitive::Sphere
            }
        };
        let camera = CameraBasis::new(&job.scene.camera);
        let to_light = light_direction(job.scene.camera.light_rotation_deg);
        let to_eye = -camera.forward;
        let half = (to_light + to_eye).normalize_or_zero();
        let textures = Textures {
            albedo: load_texture("albedo", job.params.albedo_map.as_deref()),
            metalness: load_texture("metalness", job.params.metalness_map.as_deref()),
        };

        let p = &job.params;
        let albedo = Vec3::from_array(p.albedo);
        let shininess = 2.0 + p.smoothness * p.smoothness * 254.0;
        let aspect = w as f32 / h as f32;
        let mut img = image::RgbImage::new(w, h);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let sx = ((x as f32 + 0.5) / w as f32 * 2.0 - 1.0) * VIEW_EXTENT * aspect;
            let sy = (1.0 - (y as f32 + 0.5) / h as f32 * 2.0) * VIEW_EXTENT;
            let origin = camera.position + camera.right * sx + camera.up * sy;

            let Some(hit) = intersect(primitive, origin, camera.forward) else {
                let shade = 1.0 - 0.25 * (y as f32 / h as f32);
                *px = image::Rgb(self.background.map(|c| (c as f32 * shade) as u8));
                continue;
            };

            let base = albedo * sample(textures.albedo.as_ref(), hit.uv).unwrap_or(Vec3::ONE);
            let metal = p.metalness * sample(textures.metalness.as_ref(), hit.uv).map_or(1.0, |m| m.x);

            let ndl = hit.normal.dot(to_light).max(0.0);
            let ndh = hit.normal.dot(half).max(0.0);
            let spec = ndh.powf(shininess) * (0.25 + 0.75 * p.smoothness) * ndl;

            let f0 = Vec3::splat(0.04).lerp(base, metal);
            let diffuse = base * (1.0 - metal);
            let rgb = base * AMBIENT + diffuse * ndl + f0 * spec;
            *px = image::Rgb(rgb.to_array().map(encode_srgb));
        }
        Ok(img)
    }
}

struct CameraBasis {
    position: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
}

impl CameraBasis {
    fn new(cfg: &CameraConfig) -> Self {
        let position = Vec3::from_array(cfg.position);
        let forward = (-position).normalize_or_zero();
        // Looking straight along Z leaves no horizon to build on.
        let right = forward
            .cross(Vec3::Z)
            .try_normalize()
            .unwrap_or(Vec3::X);
        let up = right.cross(forward);
        Self {
            position,
            forward,
            right,
            up,
        }
    }
}

/// Unit vector towards a sun pointing down -Z, rotated about X by `deg`.
fn light_direction(deg: f32) -> Vec3 {
    (Quat::from_rotation_x(deg.to_radians()) * Vec3::Z).normalize_or_zero()
}

fn intersect(primitive: Primitive, o: Vec3, d: Vec3) -> Option<Hit> {
    match primitive {
        Primitive::Sphere => intersect_sphere(o, d),
        Primitive::Cube => intersect_box(o, d),
        Primitive::Cylinder => intersect_cylinder(o, d),
    }
}

fn intersect_sphere(o: Vec3, d: Vec3) -> Option<Hit> {
    let b = o.dot(d);
    let c = o.length_squared() - 1.0;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    if t < 0.0 {
        return None;
    }
    let n = (o + d * t).normalize_or_zero();
    let u = n.y.atan2(n.x) / std::f32::consts::TAU + 0.5;
    let v = n.z.clamp(-1.0, 1.0).acos() / std::f32::consts::PI;
    Some(Hit {
        normal: n,
        uv: Vec2::new(u, v),
    })
}

fn intersect_box(o: Vec3, d: Vec3) -> Option<Hit> {
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    let mut axis = 0usize;
    for i in 0..3 {
        if d[i].abs() < 1e-8 {
            if o[i].abs() > BOX_HALF {
                return None;
            }
            continue;
        }
        let t1 = (-BOX_HALF - o[i]) / d[i];
        let t2 = (BOX_HALF - o[i]) / d[i];
        let (lo, hi) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
        if lo > t_near {
            t_near = lo;
            axis = i;
        }
        t_far = t_far.min(hi);
    }
    if t_near > t_far || t_far < 0.0 {
        return None;
    }
    let p = o + d * t_near;
    let mut n = Vec3::ZERO;
    n[axis] = p[axis].signum();
    let (a, b) = ((axis + 1) % 3, (axis + 2) % 3);
    let uv = (Vec2::new(p[a], p[b]) / BOX_HALF + Vec2::ONE) * 0.5;
    Some(Hit { normal: n, uv })
}

fn intersect_cylinder(o: Vec3, d: Vec3) -> Option<Hit> {
    let mut best: Option<(f32, Hit)> = None;

    // Side.
    let (o2, d2) = (o.truncate(), d.truncate());
    let a = d2.length_squared();
    if a > 1e-8 {
        let b = o2.dot(d2);
        let c = o2.length_squared() - CYLINDER_RADIUS * CYLINDER_RADIUS;
        let disc = b * b - a * c;
        if disc >= 0.0 {
            let t = (-b - disc.sqrt()) / a;
            let p = o + d * t;
            if t >= 0.0 && p.z.abs() <= CYLINDER_HALF_HEIGHT {
                let n = p.truncate().extend(0.0).normalize_or_zero();
                let u = p.y.atan2(p.x) / std::f32::consts::TAU + 0.5;
                let v = (p.z / CYLINDER_HALF_HEIGHT + 1.0) * 0.5;
                best = Some((t, Hit {
                    normal: n,
                    uv: Vec2::new(u, v),
                }));
            }
        }
    }

    // Caps.
    if d.z.abs() > 1e-8 {
        for cap in [-CYLINDER_HALF_HEIGHT, CYLINDER_HALF_HEIGHT] {
            let t = (cap - o.z) / d.z;
            if t < 0.0 || best.as_ref().is_some_and(|(bt, _)| *bt <= t) {
                continue;
            }
            let p = o + d * t;
            if p.truncate().length_squared() <= CYLINDER_RADIUS * CYLINDER_RADIUS {
                let uv = (p.truncate() / CYLINDER_RADIUS + Vec2::ONE) * 0.5;
                best = Some((t, Hit {
                    normal: Vec3::Z * cap.signum(),
                    uv,
                }));
            }
        }
    }

    best.map(|(_, hit)| hit)
}

fn load_texture(label: &str, path: Option<&Path>) -> Option<image::RgbImage> {
    let path: PathBuf = path?.to_path_buf();
    match image::open(&path) {
        Ok(img) => Some(img.to_rgb8()),
        Err(e) => {
            tracing::warn!(map = label, path = %path.display(), error = %e, "texture map ignored");
            None
        }
    }
}

/// Nearest-neighbour lookup with wrapping, returned as linear `[0, 1]` channels.
fn sample(tex: Option<&image::RgbImage>, uv: Vec2) -> Option<Vec3> {
    let tex = tex?;
    let (w, h) = tex.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let x = (uv.x.rem_euclid(1.0) * w as f32) as u32;
    let y = (uv.y.rem_euclid(1.0) * h as f32) as u32;
    let px = tex.get_pixel(x.min(w - 1), y.min(h - 1));
    Some(Vec3::from_array(px.0.map(decode_srgb)))
}

fn encode_srgb(linear: f32) -> u8 {
    let v = linear.clamp(0.0, 1.0).powf(1.0 / 2.2);
    (v * 255.0 + 0.5) as u8
}

fn decode_srgb(c: u8) -> f32 {
    (c as f32 / 255.0).powf(2.2)
}
