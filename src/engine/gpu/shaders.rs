//! WGSL sources. Struct layouts match `uniforms.rs`.

const COMMON: &str = r#"
struct Frame {
    view_proj: mat4x4<f32>,
    inv_view_proj: mat4x4<f32>,
    light_view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    ambient: vec4<f32>,
    point_lights: array<vec4<f32>, 4>,
    lighting: vec4<f32>,
    environment: vec4<f32>,
};

struct Item {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    base_color: vec4<f32>,
    surface: vec4<f32>,
    grid: vec4<f32>,
    grid_line_color: vec4<f32>,
};

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};
"#;

const MESH: &str = r#"
const PI: f32 = 3.14159265;

@group(0) @binding(0) var<uniform> frame: Frame;
@group(0) @binding(1) var shadow_map: texture_depth_2d;
@group(0) @binding(2) var shadow_sampler: sampler_comparison;
@group(0) @binding(3) var environment_map: texture_cube<f32>;
@group(0) @binding(4) var environment_sampler: sampler;
@group(1) @binding(0) var<uniform> item: Item;
@group(2) @binding(0) var albedo_map: texture_2d<f32>;
@group(2) @binding(1) var albedo_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let world = item.model * vec4<f32>(in.position, 1.0);
    var out: VertexOutput;
    out.clip_position = frame.view_proj * world;
    out.world_position = world.xyz;
    out.normal = (item.normal_matrix * vec4<f32>(in.normal, 0.0)).xyz;
    out.uv = in.uv;
    return out;
}

fn shadow_visibility(world_position: vec3<f32>) -> f32 {
    if frame.lighting.y < 0.5 || item.surface.w < 0.5 {
        return 1.0;
    }
    let light_clip = frame.light_view_proj * vec4<f32>(world_position, 1.0);
    if light_clip.w <= 0.0 {
        return 1.0;
    }
    let ndc = light_clip.xyz / light_clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)) || ndc.z > 1.0 {
        return 1.0;
    }
    let texel = 1.0 / vec2<f32>(textureDimensions(shadow_map));
    let radius = i32(frame.lighting.w);
    let depth = ndc.z - frame.lighting.z;
    var lit = 0.0;
    var taps = 0.0;
    for (var x = -radius; x <= radius; x++) {
        for (var y = -radius; y <= radius; y++) {
            let offset = vec2<f32>(f32(x), f32(y)) * texel;
            lit += textureSampleCompareLevel(shadow_map, shadow_sampler, uv + offset, depth);
            taps += 1.0;
        }
    }
    return lit / taps;
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (vec3<f32>(1.0) - f0) * pow(1.0 - cos_theta, 5.0);
}

fn grid_line(coord: vec2<f32>) -> f32 {
    let width = max(fwidth(coord), vec2<f32>(1e-4));
    let dist = abs(fract(coord - 0.5) - 0.5) / width;
    return 1.0 - min(min(dist.x, dist.y), 1.0);
}

@fragment
fn fs_main(in: VertexOutput, @builtin(front_facing) front_facing: bool) -> @location(0) vec4<f32> {
    // Derivative-based sampling stays in uniform control flow.
    let albedo = textureSample(albedo_map, albedo_sampler, in.uv);
    let grid_coord = in.world_position.xz / max(item.grid.y, 1e-3);
    let minor = grid_line(grid_coord);
    let major = grid_line(grid_coord / max(item.grid.z, 1.0));

    if item.grid.x > 0.5 {
        let line = max(minor * 0.5, major);
        let grid_color = mix(item.base_color.rgb, item.grid_line_color.rgb, line);
        return vec4<f32>(grid_color, mix(item.grid.w, 1.0, line));
    }

    var n = normalize(in.normal);
    if !front_facing {
        n = -n;
    }
    let v = normalize(frame.camera_position.xyz - in.world_position);
    let base = item.base_color.rgb * albedo.rgb;
    let alpha = item.base_color.a * albedo.a;
    let metallic = clamp(item.surface.x, 0.0, 1.0);
    let roughness = clamp(item.surface.y, 0.045, 1.0);
    let f0 = mix(vec3<f32>(0.04), base, metallic);
    let diffuse = base * (1.0 - metallic);
    let n_dot_v = max(dot(n, v), 1e-4);

    var color = vec3<f32>(0.0);
    if frame.environment.x > 0.5 {
        let max_level = frame.environment.y;
        let irradiance = textureSampleLevel(environment_map, environment_sampler, n, max_level).rgb;
        let reflected = textureSampleLevel(
            environment_map,
            environment_sampler,
            reflect(-v, n),
            roughness * max_level,
        ).rgb;
        color += diffuse * irradiance + reflected * fresnel_schlick(n_dot_v, f0);
    }
    if frame.ambient.w > 0.0 {
        let hemi = 0.5 + 0.5 * dot(n, frame.ambient.xyz);
        color += (diffuse + f0 * 0.5) * frame.ambient.w * hemi;
    }

    let shadow = shadow_visibility(in.world_position);
    let count = u32(frame.lighting.x);
    for (var i = 0u; i < count; i++) {
        let light = frame.point_lights[i];
        let l = normalize(light.xyz - in.world_position);
        let h = normalize(l + v);
        let n_dot_l = max(dot(n, l), 0.0);
        let n_dot_h = max(dot(n, h), 0.0);
        let fresnel = fresnel_schlick(max(dot(h, v), 0.0), f0);
        let specular = distribution_ggx(n_dot_h, roughness) * fresnel * 0.25 * item.surface.z;
        var visibility = 1.0;
        if i == 0u {
            visibility = shadow;
        }
        color += (diffuse + specular) * n_dot_l * light.w * visibility;
    }
    return vec4<f32>(color, alpha);
}
"#;

const SKYBOX: &str = r#"
@group(0) @binding(0) var<uniform> frame: Frame;
@group(0) @binding(3) var environment_map: texture_cube<f32>;
@group(0) @binding(4) var environment_sampler: sampler;

struct SkyOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
};

@vertex
fn vs_sky(@builtin(vertex_index) index: u32) -> SkyOutput {
    let corner = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    let ndc = corner * 2.0 - 1.0;
    var out: SkyOutput;
    out.clip_position = vec4<f32>(ndc, 1.0, 1.0);
    out.ndc = ndc;
    return out;
}

@fragment
fn fs_sky(in: SkyOutput) -> @location(0) vec4<f32> {
    let far_point = frame.inv_view_proj * vec4<f32>(in.ndc, 1.0, 1.0);
    let near_point = frame.inv_view_proj * vec4<f32>(in.ndc, 0.0, 1.0);
    let direction = normalize(far_point.xyz / far_point.w - near_point.xyz / near_point.w);
    let color = textureSampleLevel(environment_map, environment_sampler, direction, 0.0).rgb;
    return vec4<f32>(color, 1.0);
}
"#;

const SHADOW: &str = r#"
struct ShadowPass {
    light_view_proj: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> shadow_pass: ShadowPass;
@group(1) @binding(0) var<uniform> item: Item;

@vertex
fn vs_shadow(in: VertexInput) -> @builtin(position) vec4<f32> {
    return shadow_pass.light_view_proj * item.model * vec4<f32>(in.position, 1.0);
}
"#;

pub(super) fn mesh_source() -> String {
    [COMMON, MESH].concat()
}

pub(super) fn skybox_source() -> String {
    [COMMON, SKYBOX].concat()
}

pub(super) fn shadow_source() -> String {
    [COMMON, SHADOW].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_declare_their_entry_points() {
        assert!(mesh_source().contains("fn vs_main") && mesh_source().contains("fn fs_main"));
        assert!(skybox_source().contains("fn vs_sky") && skybox_source().contains("fn fs_sky"));
        assert!(shadow_source().contains("fn vs_shadow"));
    }
}
