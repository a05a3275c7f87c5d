//! wgpu compute side of the path tracer.
//!
//! Bindings (group 0):
//! - 0: `RenderConfig` uniform
//! - 1: scene uniform, `positions[N]` then `materials[N]`
//! - 2: accumulation storage buffer, one `vec4<f32>` per pixel

use crate::{
    frame::RenderConfig,
    kernel::{KernelDefines, KernelError},
    scene::{SceneBuffer, SPHERE_STRIDE},
};

/// Bytes per accumulated pixel (rgba32float).
pub const PIXEL_SIZE: u64 = 16;

/// A compiled ray tracing kernel. Dropping it releases the pipeline.
#[derive(Debug)]
pub struct ComputeKernel {
    pipeline: wgpu::ComputePipeline,
}

pub struct AccumulationBuffer {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    pending_clear: bool,
}

impl AccumulationBuffer {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Accumulation Buffer"),
            size: width as u64 * height as u64 * PIXEL_SIZE,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            width,
            height,
            pending_clear: true,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub struct PathTraceCompute {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    config_buffer: wgpu::Buffer,
    scene_buffer: wgpu::Buffer,
    accumulation: AccumulationBuffer,
    bind_group: wgpu::BindGroup,
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl PathTraceCompute {
    pub fn new(device: &wgpu::Device, defines: &KernelDefines, width: u32, height: u32) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ray_trace_bind_group_layout"),
            entries: &[
                uniform_entry(0),
                uniform_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ray Trace Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let config_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Config Buffer"),
            size: std::mem::size_of::<RenderConfig>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let scene_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Spheres Buffer"),
            size: u64::from(defines.spheres_count) * SPHERE_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let accumulation = AccumulationBuffer::new(device, width, height);
        let bind_group = Self::create_bind_group(
            device,
            &bind_group_layout,
            &config_buffer,
            &scene_buffer,
            &accumulation,
        );

        Self {
            bind_group_layout,
            pipeline_layout,
            config_buffer,
            scene_buffer,
            accumulation,
            bind_group,
        }
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        config_buffer: &wgpu::Buffer,
        scene_buffer: &wgpu::Buffer,
        accumulation: &AccumulationBuffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ray_trace_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: config_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: scene_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: accumulation.buffer.as_entire_binding(),
                },
            ],
        })
    }

    /// Recreate the accumulation buffer. The new one starts out pending a clear.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if self.accumulation.size() == (width, height) {
            return;
        }
        self.accumulation = AccumulationBuffer::new(device, width, height);
        self.bind_group = Self::create_bind_group(
            device,
            &self.bind_group_layout,
            &self.config_buffer,
            &self.scene_buffer,
            &self.accumulation,
        );
    }

    /// Compile `source` with the defines prepended. Validation errors are
    /// captured in an error scope and returned instead of reaching the
    /// device's uncaptured error handler.
    pub fn compile_kernel(
        &self,
        device: &wgpu::Device,
        source: &str,
        defines: &KernelDefines,
    ) -> Result<ComputeKernel, KernelError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ray_trace_kernel"),
            source: wgpu::ShaderSource::Wgsl(defines.expand(source).into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Ray Trace Pipeline"),
            layout: Some(&self.pipeline_layout),
            module: &module,
            entry_point: "main",
        });
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(KernelError::Compile(err.to_string())),
            None => Ok(ComputeKernel { pipeline }),
        }
    }

    pub fn mark_clear(&mut self) {
        self.accumulation.pending_clear = true;
    }

    pub fn upload_scene(&self, queue: &wgpu::Queue, scene: &SceneBuffer) {
        queue.write_buffer(&self.scene_buffer, 0, scene.as_bytes());
    }

    /// Record the pending clear (if any) and the compute pass.
    pub fn encode(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        kernel: &ComputeKernel,
        config: &RenderConfig,
        workgroups: [u32; 3],
    ) {
        if std::mem::take(&mut self.accumulation.pending_clear) {
            encoder.clear_buffer(&self.accumulation.buffer, 0, None);
        }
        queue.write_buffer(&self.config_buffer, 0, bytemuck::bytes_of(config));

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Ray Trace Pass"),
        });
        pass.set_pipeline(&kernel.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
    }

    pub fn config_buffer(&self) -> &wgpu::Buffer {
        &self.config_buffer
    }

    pub fn accumulation(&self) -> &AccumulationBuffer {
        &self.accumulation
    }
}
