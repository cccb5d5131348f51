use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::assets::AssetLibrary;
use crate::mesh::{parse_obj, MeshData};
use crate::scene::PropKind;
use crate::world::WorldObject;

/// Camera parameters consumed by the renderer's uniform buffer.
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Lighting state consumed by the renderer's uniform buffer.
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// Sky/fog tint and the distance band over which geometry fades into it.
const FOG_COLOR: [f64; 3] = [0.878, 0.878, 0.878];
const FOG_RANGE: (f32, f32) = (20.0, 100.0);

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Placeholder drawn for objects whose mesh has not arrived (or failed).
const FALLBACK_CUBE_OBJ: &str = "\
v -0.5 -0.5 0.5
v 0.5 -0.5 0.5
v 0.5 0.5 0.5
v -0.5 0.5 0.5
v -0.5 -0.5 -0.5
v 0.5 -0.5 -0.5
v 0.5 0.5 -0.5
v -0.5 0.5 -0.5
vn 0 0 1
vn 0 0 -1
vn -1 0 0
vn 1 0 0
vn 0 -1 0
vn 0 1 0
f 1//1 2//1 3//1 4//1
f 6//2 5//2 8//2 7//2
f 5//3 1//3 4//3 8//3
f 2//4 6//4 7//4 3//4
f 5//5 6//5 2//5 1//5
f 4//6 3//6 7//6 8//6
";

/// Forward renderer drawing the visible world snapshot in one pass.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    model_layout: wgpu::BindGroupLayout,
    mesh_cache: HashMap<String, GpuMesh>,
    fallback_mesh: GpuMesh,
}

impl Renderer {
    /// Initializes the GPU renderer for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        // SAFETY: the window outlives the surface; both live in this struct
        let surface = unsafe { instance.create_surface(window.as_ref()) }?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("garden-device"),
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let config = surface_config(&surface, &adapter, size);
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, config.width, config.height);

        let frame_layout = uniform_layout(&device, "frame-layout", frame_uniform_size());
        let model_layout = uniform_layout(&device, "model-layout", model_uniform_size());

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-uniforms"),
            size: frame_uniform_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame-bind-group"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let pipeline = build_pipeline(&device, config.format, &frame_layout, &model_layout);

        let fallback = parse_obj(FALLBACK_CUBE_OBJ).context("fallback cube is malformed")?;
        let fallback_mesh = GpuMesh::upload(&device, &fallback, "fallback-cube");

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth_view,
            pipeline,
            frame_buffer,
            frame_bind_group,
            model_layout,
            mesh_cache: HashMap::new(),
            fallback_mesh,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, new_size.width, new_size.height);
    }

    /// Uploads meshes that finished loading since the last call. Objects
    /// whose mesh is pending or failed keep drawing as the fallback cube.
    pub fn sync_meshes(&mut self, assets: &AssetLibrary) {
        for name in assets.ready_names() {
            if self.mesh_cache.contains_key(name) {
                continue;
            }
            if let Some(mesh) = assets.mesh(name) {
                self.mesh_cache
                    .insert(name.to_string(), GpuMesh::upload(&self.device, mesh, name));
            }
        }
    }

    /// Updates the per-frame camera and lighting uniforms.
    pub fn update_globals(&self, camera: &CameraParams, light: &LightParams) {
        let uniforms = FrameUniforms {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            light_position: light.position.extend(light.intensity).into(),
            light_color: light.color.extend(1.0).into(),
            fog: [
                FOG_COLOR[0] as f32,
                FOG_COLOR[1] as f32,
                FOG_COLOR[2] as f32,
                0.0,
            ],
            fog_range: [FOG_RANGE.0, FOG_RANGE.1, 0.0, 0.0],
        };
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytes_of(&uniforms));
    }

    /// Draws the visible objects of the provided world snapshot.
    pub fn render(&mut self, objects: &[WorldObject]) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let target = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("garden-encoder"),
            });

        let draws: Vec<(Option<String>, wgpu::BindGroup)> = objects
            .iter()
            .filter(|object| drawable(object))
            .map(|object| (object.mesh.clone(), self.model_bind_group(object)))
            .collect();

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("garden-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: FOG_COLOR[0],
                            g: FOG_COLOR[1],
                            b: FOG_COLOR[2],
                            a: 1.0,
                        }),
                        store: true,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: true,
                    }),
                    stencil_ops: None,
                }),
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.frame_bind_group, &[]);

            for (mesh_name, bind_group) in &draws {
                let mesh = mesh_name
                    .as_deref()
                    .and_then(|name| self.mesh_cache.get(name))
                    .unwrap_or(&self.fallback_mesh);
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.set_bind_group(1, bind_group, &[]);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn model_bind_group(&self, object: &WorldObject) -> wgpu::BindGroup {
        let model = object.model_matrix();
        let normal = Mat3::from_mat4(model).inverse().transpose().to_cols_array();
        let uniforms = ModelUniforms {
            model: model.to_cols_array_2d(),
            normal: [
                [normal[0], normal[1], normal[2], 0.0],
                [normal[3], normal[4], normal[5], 0.0],
                [normal[6], normal[7], normal[8], 0.0],
            ],
            color: object.color.extend(1.0).into(),
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("model-uniforms"),
                contents: bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("model-bind-group"),
            layout: &self.model_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }
}

/// Cameras and lights are scene data, not geometry.
fn drawable(object: &WorldObject) -> bool {
    object.visible && !matches!(object.kind, PropKind::Camera | PropKind::Light)
}

fn surface_config(
    surface: &wgpu::Surface,
    adapter: &wgpu::Adapter,
    size: PhysicalSize<u32>,
) -> wgpu::SurfaceConfiguration {
    let caps = surface.get_capabilities(adapter);
    let format = caps
        .formats
        .iter()
        .copied()
        .find(wgpu::TextureFormat::is_srgb)
        .unwrap_or(caps.formats[0]);
    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width,
        height: size.height,
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: caps.alpha_modes[0],
        view_formats: vec![],
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth-texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn uniform_layout(device: &wgpu::Device, label: &str, size: u64) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(size),
            },
            count: None,
        }],
    })
}

fn build_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    frame_layout: &wgpu::BindGroupLayout,
    model_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("garden-shader"),
        source: wgpu::ShaderSource::Wgsl(SHADER.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("garden-pipeline-layout"),
        bind_group_layouts: &[frame_layout, model_layout],
        push_constant_ranges: &[],
    });

    let stride = (6 * std::mem::size_of::<f32>()) as u64;
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("garden-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
    })
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertices,
            indices,
            index_count: mesh.indices.len() as u32,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FrameUniforms {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    // xyz = position, w = intensity
    light_position: [f32; 4],
    light_color: [f32; 4],
    fog: [f32; 4],
    // x = fog near, y = fog far
    fog_range: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ModelUniforms {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    color: [f32; 4],
}

const fn frame_uniform_size() -> u64 {
    std::mem::size_of::<FrameUniforms>() as u64
}

const fn model_uniform_size() -> u64 {
    std::mem::size_of::<ModelUniforms>() as u64
}

const SHADER: &str = r#"
struct FrameUniforms {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_position: vec4<f32>,
    light_color: vec4<f32>,
    fog: vec4<f32>,
    fog_range: vec4<f32>,
}

struct ModelUniforms {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> frame: FrameUniforms;

@group(1) @binding(0)
var<uniform> object: ModelUniforms;

struct VsIn {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(in: VsIn) -> VsOut {
    var out: VsOut;
    let world = object.model * vec4<f32>(in.position, 1.0);
    out.clip = frame.view_proj * world;
    out.world_pos = world.xyz;
    let n = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz,
    );
    out.normal = normalize(n * in.normal);
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);
    let to_light = normalize(frame.light_position.xyz - in.world_pos);
    // half-lambert keyed light plus a sky-tinted fill from above
    let key = pow(max(dot(n, to_light), 0.0) * 0.5 + 0.5, 2.0);
    let fill = (n.y * 0.5 + 0.5) * 0.25;
    let intensity = frame.light_position.w;
    let lit = (key * intensity * 0.4 + fill + 0.2)
        * object.color.rgb * frame.light_color.rgb;

    let dist = distance(frame.camera_position.xyz, in.world_pos);
    let fog_t = clamp(
        (dist - frame.fog_range.x) / (frame.fog_range.y - frame.fog_range.x),
        0.0,
        1.0,
    );
    let color = mix(lit, frame.fog.rgb, fog_t);
    return vec4<f32>(color, object.color.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::PropSpec;

    fn object(kind: PropKind, visible: bool) -> WorldObject {
        let mut object = WorldObject::from(&PropSpec {
            name: "test".into(),
            kind,
            ..PropSpec::default()
        });
        object.visible = visible;
        object
    }

    #[test]
    fn hidden_objects_are_skipped() {
        assert!(drawable(&object(PropKind::Wall, true)));
        assert!(!drawable(&object(PropKind::Wall, false)));
    }

    #[test]
    fn camera_and_light_are_never_drawn() {
        assert!(!drawable(&object(PropKind::Camera, true)));
        assert!(!drawable(&object(PropKind::Light, true)));
    }

    #[test]
    fn fallback_cube_parses_through_the_mesh_loader() {
        let mesh = parse_obj(FALLBACK_CUBE_OBJ).unwrap();
        assert_eq!(mesh.indices.len(), 36);
        assert_eq!(mesh.vertices.len() / 6, 24);
    }
}
