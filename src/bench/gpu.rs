//! GPU benchmark
//!
//! Renders a rotating triangle scene frame by frame through a [`RenderBackend`]
//! and runs a particle-integration compute pass. When no graphics backend is
//! available the [`SoftwareRasterizer`] stands in, producing the same score shape.
//!
//! Sub-scores:
//! - fill rate: shaded pixels per second
//! - geometry: triangles per second
//! - compute: particle updates per second
//! - frame rate: average frames per second
//!
//! Total = 30% fill + 25% geometry + 25% compute + 20% frame rate.
//!
//! Frame pacing is reported as `stability_percent` = 1% low FPS / average FPS.

use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    rate_per_sec, rate_score, timed, try_alloc, weighted_total, Domain, DomainBenchmark,
    DomainScore, XorShift,
};
use crate::scoring::Grade;

const FILL_WEIGHT: f64 = 0.30;
const GEOMETRY_WEIGHT: f64 = 0.25;
const COMPUTE_WEIGHT: f64 = 0.25;
const FRAME_WEIGHT: f64 = 0.20;

const PIXELS_PER_POINT: f64 = 20_000.0;
const TRIANGLES_PER_POINT: f64 = 200.0;
const PARTICLE_UPDATES_PER_POINT: f64 = 20_000.0;
const FPS_PER_POINT: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuResult {
    /// Name of the backend that rendered the frames.
    pub backend: String,
    pub frames: u32,
    pub average_fps: f64,
    /// 1% low FPS (99th percentile frame time).
    pub low_fps: f64,
    /// `low_fps / average_fps * 100`, capped at 100.
    pub stability_percent: f64,
    pub fill_rate_score: u32,
    pub geometry_score: u32,
    pub compute_score: u32,
    pub frame_score: u32,
    pub total_score: u32,
    pub grade: Grade,
}

impl GpuResult {
    fn zeroed(backend: &str) -> Self {
        Self::from_parts(backend, FrameSummary::default(), 0, 0, 0)
    }

    fn from_parts(
        backend: &str,
        frames: FrameSummary,
        fill_rate_score: u32,
        geometry_score: u32,
        compute_score: u32,
    ) -> Self {
        let frame_score = rate_score(frames.average_fps, FPS_PER_POINT);
        let total_score = weighted_total(&[
            (fill_rate_score, FILL_WEIGHT),
            (geometry_score, GEOMETRY_WEIGHT),
            (compute_score, COMPUTE_WEIGHT),
            (frame_score, FRAME_WEIGHT),
        ]);
        Self {
            backend: backend.to_string(),
            frames: frames.frames,
            average_fps: frames.average_fps,
            low_fps: frames.low_fps,
            stability_percent: frames.stability_percent,
            fill_rate_score,
            geometry_score,
            compute_score,
            frame_score,
            total_score,
            grade: Grade::from_score(total_score),
        }
    }
}

impl DomainScore for GpuResult {
    fn domain(&self) -> Domain {
        Domain::Gpu
    }

    fn total_score(&self) -> u32 {
        self.total_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuWorkload {
    pub width: usize,
    pub height: usize,
    pub frames: u32,
    pub triangles_per_frame: usize,
    pub particles: usize,
    pub compute_steps: u32,
}

impl GpuWorkload {
    pub const FULL: GpuWorkload = GpuWorkload {
        width: 1280,
        height: 720,
        frames: 240,
        triangles_per_frame: 400,
        particles: 200_000,
        compute_steps: 60,
    };

    pub const QUICK: GpuWorkload = GpuWorkload {
        width: 640,
        height: 360,
        frames: 100,
        triangles_per_frame: 200,
        particles: 50_000,
        compute_steps: 20,
    };
}

/// Color target for one frame.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl Framebuffer {
    /// Allocate a cleared target, or `None` when memory is unavailable.
    pub fn try_new(width: usize, height: usize) -> Option<Self> {
        let len = width.checked_mul(height)?;
        let pixels = try_alloc::<u32>(len)?;
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn clear(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub color: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

/// Work done for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub triangles: u64,
    pub pixels: u64,
}

/// Something that can draw triangles into a framebuffer.
pub trait RenderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, target: &mut Framebuffer, triangles: &[Triangle]) -> RenderStats;
}

/// Platform-agnostic CPU rasterizer with per-pixel color interpolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareRasterizer;

impl RenderBackend for SoftwareRasterizer {
    fn name(&self) -> &str {
        "software"
    }

    fn render(&self, target: &mut Framebuffer, triangles: &[Triangle]) -> RenderStats {
        let mut stats = RenderStats::default();
        for triangle in triangles {
            stats.pixels += rasterize(target, triangle);
            stats.triangles += 1;
        }
        stats
    }
}

fn edge(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> f32 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn rasterize(target: &mut Framebuffer, triangle: &Triangle) -> u64 {
    let [v0, v1, v2] = triangle.vertices;
    let (p0, p1, p2) = ((v0.x, v0.y), (v1.x, v1.y), (v2.x, v2.y));
    let area = edge(p0, p1, p2);
    if area.abs() < f32::EPSILON || target.width == 0 || target.height == 0 {
        return 0;
    }

    let max_x = (target.width - 1) as f32;
    let max_y = (target.height - 1) as f32;
    let min_px = v0.x.min(v1.x).min(v2.x).floor().clamp(0.0, max_x) as usize;
    let max_px = v0.x.max(v1.x).max(v2.x).ceil().clamp(0.0, max_x) as usize;
    let min_py = v0.y.min(v1.y).min(v2.y).floor().clamp(0.0, max_y) as usize;
    let max_py = v0.y.max(v1.y).max(v2.y).ceil().clamp(0.0, max_y) as usize;

    let mut shaded = 0u64;
    for y in min_py..=max_py {
        let row = y * target.width;
        for x in min_px..=max_px {
            let p = (x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(p1, p2, p) / area;
            let w1 = edge(p2, p0, p) / area;
            let w2 = edge(p0, p1, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let channel = |i: usize| {
                let c = v0.color[i] * w0 + v1.color[i] * w1 + v2.color[i] * w2;
                (c.clamp(0.0, 1.0) * 255.0) as u32
            };
            target.pixels[row + x] = 0xff00_0000 | channel(0) << 16 | channel(1) << 8 | channel(2);
            shaded += 1;
        }
    }
    shaded
}

/// Deterministic scene, rotated about the frame center by `angle` radians.
fn build_scene(base: &[Triangle], angle: f32, center: (f32, f32), out: &mut Vec<Triangle>) {
    let (sin, cos) = angle.sin_cos();
    out.clear();
    out.extend(base.iter().map(|tri| {
        let mut rotated = *tri;
        for v in rotated.vertices.iter_mut() {
            let dx = v.x - center.0;
            let dy = v.y - center.1;
            v.x = center.0 + dx * cos - dy * sin;
            v.y = center.1 + dx * sin + dy * cos;
        }
        rotated
    }));
}

fn base_scene(workload: &GpuWorkload) -> Vec<Triangle> {
    let mut rng = XorShift::new(0x6170_u64);
    let w = workload.width as f32;
    let h = workload.height as f32;
    let size = (w.min(h) / 6.0).max(2.0);
    (0..workload.triangles_per_frame)
        .map(|_| {
            let cx = rng.next_f32() * w;
            let cy = rng.next_f32() * h;
            let vertex = |rng: &mut XorShift| Vertex {
                x: cx + (rng.next_f32() - 0.5) * size,
                y: cy + (rng.next_f32() - 0.5) * size,
                color: [rng.next_f32(), rng.next_f32(), rng.next_f32()],
            };
            Triangle {
                vertices: [vertex(&mut rng), vertex(&mut rng), vertex(&mut rng)],
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct FrameSummary {
    frames: u32,
    average_fps: f64,
    low_fps: f64,
    stability_percent: f64,
}

impl FrameSummary {
    fn from_frame_times(frame_times: &[Duration]) -> Self {
        if frame_times.is_empty() {
            return Self::default();
        }
        let total: f64 = frame_times.iter().map(Duration::as_secs_f64).sum();
        if total <= 0.0 {
            return Self::default();
        }
        let average_fps = frame_times.len() as f64 / total;

        let mut sorted: Vec<f64> = frame_times.iter().map(Duration::as_secs_f64).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        // 99th percentile frame time; the slowest frame when there are fewer than 100.
        let idx = ((sorted.len() as f64 * 0.99) as usize).min(sorted.len() - 1);
        let p99 = sorted[idx];
        let low_fps = if p99 > 0.0 { 1.0 / p99 } else { average_fps };

        let stability_percent = if average_fps > 0.0 {
            (low_fps / average_fps * 100.0).min(100.0)
        } else {
            0.0
        };

        Self {
            frames: frame_times.len() as u32,
            average_fps,
            low_fps,
            stability_percent,
        }
    }
}

pub struct GpuBenchmark {
    backend: Arc<dyn RenderBackend>,
    full: GpuWorkload,
    quick: GpuWorkload,
}

impl GpuBenchmark {
    /// Pick the best available backend. No hardware backend is linked in, so this
    /// is always the software rasterizer.
    pub fn detect() -> Self {
        info!("No graphics backend available; using software rasterizer");
        Self::with_backend(Arc::new(SoftwareRasterizer))
    }

    pub fn with_backend(backend: Arc<dyn RenderBackend>) -> Self {
        Self::with_workloads(backend, GpuWorkload::FULL, GpuWorkload::QUICK)
    }

    pub fn with_workloads(
        backend: Arc<dyn RenderBackend>,
        full: GpuWorkload,
        quick: GpuWorkload,
    ) -> Self {
        Self {
            backend,
            full,
            quick,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn run_workload(&self, workload: &GpuWorkload) -> GpuResult {
        let backend_name = self.backend.name().to_string();

        let Some(mut target) = Framebuffer::try_new(workload.width, workload.height) else {
            warn!(
                width = workload.width,
                height = workload.height,
                "Framebuffer allocation failed; scoring 0"
            );
            return GpuResult::zeroed(&backend_name);
        };

        let base = base_scene(workload);
        let center = (workload.width as f32 / 2.0, workload.height as f32 / 2.0);
        let mut scene = Vec::with_capacity(base.len());
        let mut frame_times = Vec::with_capacity(workload.frames as usize);
        let mut totals = RenderStats::default();

        let render_start = Instant::now();
        for frame in 0..workload.frames {
            build_scene(&base, frame as f32 * 0.05, center, &mut scene);
            let (stats, elapsed) = timed(|| {
                target.clear(0xff00_0000);
                self.backend.render(&mut target, &scene)
            });
            frame_times.push(elapsed);
            totals.triangles += stats.triangles;
            totals.pixels += stats.pixels;
        }
        let render_elapsed = render_start.elapsed();
        black_box(target.pixel(0, 0));

        let frames = FrameSummary::from_frame_times(&frame_times);
        let fill_rate_score = rate_score(
            rate_per_sec(totals.pixels as f64, render_elapsed),
            PIXELS_PER_POINT,
        );
        let geometry_score = rate_score(
            rate_per_sec(totals.triangles as f64, render_elapsed),
            TRIANGLES_PER_POINT,
        );
        let compute_score = compute_score(workload.particles, workload.compute_steps);

        let result = GpuResult::from_parts(
            &backend_name,
            frames,
            fill_rate_score,
            geometry_score,
            compute_score,
        );
        debug!(
            backend = %backend_name,
            average_fps = result.average_fps,
            stability = result.stability_percent,
            total = result.total_score,
            "GPU benchmark finished"
        );
        result
    }
}

impl DomainBenchmark for GpuBenchmark {
    type Output = GpuResult;

    fn run_full(&self) -> GpuResult {
        self.run_workload(&self.full)
    }

    fn run_quick(&self) -> GpuResult {
        self.run_workload(&self.quick)
    }
}

/// Particle integration under a central attractor, structure-of-arrays layout.
fn compute_score(particles: usize, steps: u32) -> u32 {
    let lanes = particles.saturating_mul(2);
    let (Some(mut pos), Some(mut vel)) = (try_alloc::<f32>(lanes), try_alloc::<f32>(lanes)) else {
        warn!(particles, "Compute buffer allocation failed; scoring 0");
        return 0;
    };
    let mut rng = XorShift::new(0xc0de_u64);
    for p in pos.iter_mut() {
        *p = rng.next_f32() * 2.0 - 1.0;
    }

    let (_, elapsed) = timed(|| {
        let dt = 0.016f32;
        for _ in 0..steps {
            for (p, v) in pos.chunks_exact_mut(2).zip(vel.chunks_exact_mut(2)) {
                let d2 = p[0] * p[0] + p[1] * p[1] + 0.01;
                let inv = 1.0 / (d2 * d2.sqrt());
                v[0] -= p[0] * inv * dt;
                v[1] -= p[1] * inv * dt;
                p[0] += v[0] * dt;
                p[1] += v[1] * dt;
            }
        }
        black_box(&pos);
    });

    let updates = particles as f64 * steps as f64;
    rate_score(rate_per_sec(updates, elapsed), PARTICLE_UPDATES_PER_POINT)
}
