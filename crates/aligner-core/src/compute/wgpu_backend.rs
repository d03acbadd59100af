//! wgpu-based transform backend (Metal / Vulkan / DX12).

use bytemuck::{Pod, Zeroable};
use ndarray::Array2;
use wgpu::util::DeviceExt;

use super::TransformBackend;
use crate::channel::{Channel, Region, TransformState};
use crate::error::{AlignerError, Result};
use crate::transform::{Affine, Resample};

// ---------------------------------------------------------------------------
// Affine warp shader
// ---------------------------------------------------------------------------

const AFFINE_WARP_WGSL: &str = r"
struct Params {
    src_w: u32, src_h: u32, out_w: u32, out_h: u32,
    mode: u32, _pad0: u32, _pad1: u32, _pad2: u32,
    a0: f32, a1: f32, a2: f32, _pad3: f32,
    b0: f32, b1: f32, b2: f32, _pad4: f32,
}
@group(0) @binding(0) var<storage, read>       input:  array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;
@group(0) @binding(2) var<uniform>             params: Params;

fn tap(x: i32, y: i32) -> f32 {
    if x < 0 || y < 0 || x >= i32(params.src_w) || y >= i32(params.src_h) { return 0.0; }
    return input[u32(y) * params.src_w + u32(x)];
}

fn cubic(t_in: f32) -> f32 {
    let a = -0.5;
    let t = abs(t_in);
    if t <= 1.0 { return ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0; }
    if t < 2.0 { return ((a * t - 5.0 * a) * t + 8.0 * a) * t - 4.0 * a; }
    return 0.0;
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let row = gid.y; let col = gid.x;
    if row >= params.out_h || col >= params.out_w { return; }
    let ox = f32(col) + 0.5;
    let oy = f32(row) + 0.5;
    let sx = params.a0 * ox + params.a1 * oy + params.a2;
    let sy = params.b0 * ox + params.b1 * oy + params.b2;
    var v = 0.0;
    if params.mode == 0u {
        v = tap(i32(floor(sx)), i32(floor(sy)));
    } else {
        let fx = sx - 0.5;
        let fy = sy - 0.5;
        let x0 = i32(floor(fx));
        let y0 = i32(floor(fy));
        let tx = fx - floor(fx);
        let ty = fy - floor(fy);
        if params.mode == 1u {
            let top = tap(x0, y0) * (1.0 - tx) + tap(x0 + 1, y0) * tx;
            let bottom = tap(x0, y0 + 1) * (1.0 - tx) + tap(x0 + 1, y0 + 1) * tx;
            v = top * (1.0 - ty) + bottom * ty;
        } else {
            for (var j = 0; j < 4; j++) {
                let wy = cubic(ty + 1.0 - f32(j));
                var acc = 0.0;
                for (var i = 0; i < 4; i++) {
                    acc += tap(x0 - 1 + i, y0 - 1 + j) * cubic(tx + 1.0 - f32(i));
                }
                v += acc * wy;
            }
        }
    }
    output[row * params.out_w + col] = v;
}
";

// Field order and padding mirror the WGSL `Params` struct.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct WarpParams {
    src_w: u32,
    src_h: u32,
    out_w: u32,
    out_h: u32,
    mode: u32,
    _pad0: [u32; 3],
    a: [f32; 4],
    b: [f32; 4],
}

const WORKGROUP: u32 = 16;

impl WarpParams {
    fn new(source: (usize, usize), region: Region, m: &Affine, resample: Resample) -> Self {
        let mode = match resample {
            Resample::Nearest => 0,
            Resample::Bilinear => 1,
            Resample::Bicubic => 2,
        };
        let [a0, a1, a2, b0, b1, b2] = m.coefficients().map(|c| c as f32);
        Self {
            src_w: source.0 as u32,
            src_h: source.1 as u32,
            out_w: region.width as u32,
            out_h: region.height as u32,
            mode,
            _pad0: [0; 3],
            a: [a0, a1, a2, 0.0],
            b: [b0, b1, b2, 0.0],
        }
    }

    fn workgroups(&self) -> (u32, u32) {
        (self.out_w.div_ceil(WORKGROUP), self.out_h.div_ceil(WORKGROUP))
    }
}

fn gpu_err(context: &str, detail: impl std::fmt::Display) -> AlignerError {
    AlignerError::GpuError(format!("{context}: {detail}"))
}

/// Compute-shader warp on the first high-performance adapter.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    pipeline: wgpu::ComputePipeline,
}

impl WgpuBackend {
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| gpu_err("no usable adapter", e))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("aligner-warp"),
            ..Default::default()
        }))
        .map_err(|e| gpu_err("device request failed", e))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("affine_warp"),
            source: wgpu::ShaderSource::Wgsl(AFFINE_WARP_WGSL.into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("affine_warp"),
            layout: None,
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });
        tracing::info!(adapter = %adapter_name, "GPU warp backend ready");

        Ok(Self {
            device,
            queue,
            adapter_name,
            pipeline,
        })
    }

    /// Upload `source`, run one warp pass and copy the result into a mappable
    /// buffer, all in a single submission.
    fn encode_warp(&self, source: &[f32], params: &WarpParams) -> wgpu::Buffer {
        let out_bytes =
            u64::from(params.out_w) * u64::from(params.out_h) * std::mem::size_of::<f32>() as u64;

        let input = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("warp_input"),
            contents: bytemuck::cast_slice(source),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let uniform = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("warp_params"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("warp_output"),
            size: out_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("warp_readback"),
            size: out_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = self.pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("warp_bindings"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });

        let (groups_x, groups_y) = params.workgroups();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("affine_warp"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("affine_warp"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&output, 0, &readback, 0, out_bytes);
        self.queue.submit([encoder.finish()]);
        readback
    }

    /// Block until `readback` is mapped and return its samples.
    fn read_back(&self, readback: &wgpu::Buffer) -> Result<Vec<f32>> {
        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |mapped| {
            let _ = tx.send(mapped);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| gpu_err("poll failed", e))?;
        rx.recv()
            .map_err(|e| gpu_err("map callback dropped", e))?
            .map_err(|e| gpu_err("readback mapping failed", e))?;

        let values = bytemuck::cast_slice::<u8, f32>(&slice.get_mapped_range()).to_vec();
        readback.unmap();
        Ok(values)
    }
}

impl TransformBackend for WgpuBackend {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn is_gpu(&self) -> bool {
        true
    }

    fn try_transform_region(
        &self,
        channel: &Channel,
        state: &TransformState,
        region: Region,
        resample: Resample,
    ) -> Result<Channel> {
        let size = channel.size();
        if region.is_empty() || !region.fits_within(size.0, size.1) {
            return Err(AlignerError::InvalidRegion {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
            });
        }
        let m = Affine::for_crop(state, size.0, size.1, region.x as f64, region.y as f64);
        let params = WarpParams::new(size, region, &m, resample);

        let source = channel.data.as_standard_layout();
        let Some(samples) = source.as_slice() else {
            return Err(AlignerError::GpuError("source not contiguous".into()));
        };
        let readback = self.encode_warp(samples, &params);
        let values = self.read_back(&readback)?;

        let format = channel.format;
        let data = Array2::from_shape_vec((region.height, region.width), values)
            .map_err(|e| gpu_err("unexpected output size", e))?
            .mapv_into(|v| format.quantize(v));
        Ok(Channel::new(data, format))
    }
}
