//! Fragment kernels mirroring the built-in library programs.

use super::{FragmentContext, SoftwareBackend};
use crate::shader::library;

fn rgb(c: [f32; 4]) -> [f32; 3] {
    [c[0], c[1], c[2]]
}

fn add(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn scale(a: [f32; 3], s: f32) -> [f32; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn opaque(c: [f32; 3]) -> [f32; 4] {
    [c[0], c[1], c[2], 1.0]
}

fn tap(ctx: &FragmentContext<'_>, unit: usize, dx: f32, dy: f32) -> [f32; 3] {
    rgb(ctx.sample(unit, [ctx.uv[0] + dx, ctx.uv[1] + dy]))
}

fn texel_size(ctx: &FragmentContext<'_>, unit: usize) -> (f32, f32) {
    let [w, h] = ctx.texture_size(unit);
    (1.0 / w.max(1) as f32, 1.0 / h.max(1) as f32)
}

fn luma(c: [f32; 3]) -> f32 {
    c[0] * 0.299 + c[1] * 0.587 + c[2] * 0.114
}

fn aces(x: f32) -> f32 {
    let (a, b, c, d, e) = (2.51, 0.03, 2.43, 0.59, 0.14);
    ((x * (a * x + b)) / (x * (c * x + d) + e)).clamp(0.0, 1.0)
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn downsample(ctx: &FragmentContext<'_>) -> [f32; 4] {
    let (x, y) = texel_size(ctx, 0);
    let t = |dx: f32, dy: f32| tap(ctx, 0, dx, dy);

    let corners = [
        t(-2.0 * x, 2.0 * y),
        t(2.0 * x, 2.0 * y),
        t(-2.0 * x, -2.0 * y),
        t(2.0 * x, -2.0 * y),
    ];
    let edges = [
        t(0.0, 2.0 * y),
        t(-2.0 * x, 0.0),
        t(2.0 * x, 0.0),
        t(0.0, -2.0 * y),
    ];
    let inner = [t(-x, y), t(x, y), t(-x, -y), t(x, -y)];
    let sum = |taps: [[f32; 3]; 4]| taps.into_iter().fold([0.0; 3], add);

    let mut result = scale(t(0.0, 0.0), 0.125);
    result = add(result, scale(sum(corners), 0.03125));
    result = add(result, scale(sum(edges), 0.0625));
    result = add(result, scale(sum(inner), 0.125));
    opaque(result)
}

fn upsample(ctx: &FragmentContext<'_>) -> [f32; 4] {
    let r = ctx.define_f32("FILTER_RADIUS", 0.005);
    let t = |dx: f32, dy: f32| tap(ctx, 0, dx, dy);

    let mut result = scale(t(0.0, 0.0), 4.0);
    for (dx, dy) in [(0.0, r), (-r, 0.0), (r, 0.0), (0.0, -r)] {
        result = add(result, scale(t(dx, dy), 2.0));
    }
    for (dx, dy) in [(-r, r), (r, r), (-r, -r), (r, -r)] {
        result = add(result, t(dx, dy));
    }
    opaque(scale(result, 1.0 / 16.0))
}

fn mix(ctx: &FragmentContext<'_>) -> [f32; 4] {
    let strength = ctx.define_f32("BLOOM_STRENGTH", 0.04);
    let base = tap(ctx, 0, 0.0, 0.0);
    let bloom = tap(ctx, 1, 0.0, 0.0);
    opaque(add(scale(base, 1.0 - strength), scale(bloom, strength)))
}

fn tonemap(ctx: &FragmentContext<'_>) -> [f32; 4] {
    let gamma = ctx.define_f32("GAMMA", 2.2);
    let exposure = ctx.define_f32("EXPOSURE", 1.0);
    let hdr = tap(ctx, 0, 0.0, 0.0);
    opaque(hdr.map(|c| aces(c * exposure).powf(1.0 / gamma)))
}

fn dither(ctx: &FragmentContext<'_>) -> [f32; 4] {
    let [x, y] = ctx.frag_coord;
    let noise = fract(52.982_918 * fract(x * 0.067_110_56 + y * 0.005_837_15));
    let color = tap(ctx, 0, 0.0, 0.0);
    opaque(color.map(|c| c + (noise - 0.5) / 255.0))
}

fn fxaa(ctx: &FragmentContext<'_>) -> [f32; 4] {
    let threshold = ctx.define_f32("EDGE_THRESHOLD", 0.125);
    let threshold_min = ctx.define_f32("EDGE_THRESHOLD_MIN", 0.0312);
    let (x, y) = texel_size(ctx, 0);

    let center = tap(ctx, 0, 0.0, 0.0);
    let neighbours = [
        tap(ctx, 0, 0.0, -y),
        tap(ctx, 0, 0.0, y),
        tap(ctx, 0, x, 0.0),
        tap(ctx, 0, -x, 0.0),
    ];

    let lumas = neighbours.map(luma);
    let luma_center = luma(center);
    let luma_min = lumas.iter().copied().fold(luma_center, f32::min);
    let luma_max = lumas.iter().copied().fold(luma_center, f32::max);
    let range = luma_max - luma_min;

    if range < threshold_min.max(luma_max * threshold) {
        return opaque(center);
    }

    let average = scale(neighbours.into_iter().fold([0.0; 3], add), 0.25);
    let blend = (range / luma_max.max(0.0001)).clamp(0.0, 0.75);
    opaque(add(scale(center, 1.0 - blend), scale(average, blend)))
}

fn blur(ctx: &FragmentContext<'_>) -> [f32; 4] {
    let (x, y) = texel_size(ctx, 0);
    let mut result = scale(tap(ctx, 0, 0.0, 0.0), 4.0);
    for (dx, dy) in [(x, 0.0), (-x, 0.0), (0.0, y), (0.0, -y)] {
        result = add(result, scale(tap(ctx, 0, dx, dy), 2.0));
    }
    for (dx, dy) in [(x, y), (-x, y), (x, -y), (-x, -y)] {
        result = add(result, tap(ctx, 0, dx, dy));
    }
    opaque(scale(result, 1.0 / 16.0))
}

/// Register a kernel for every program in [`library::BUILTIN_SHADERS`].
pub fn register_library_kernels(backend: &mut SoftwareBackend) {
    backend.register_kernel(library::BLIT.label, |ctx| ctx.sample(0, ctx.uv));
    backend.register_kernel(library::DOWNSAMPLE.label, downsample);
    backend.register_kernel(library::UPSAMPLE.label, upsample);
    backend.register_kernel(library::MIX.label, mix);
    backend.register_kernel(library::TONEMAP.label, tonemap);
    backend.register_kernel(library::DITHER.label, dither);
    backend.register_kernel(library::FXAA.label, fxaa);
    backend.register_kernel(library::BLUR.label, blur);
}
