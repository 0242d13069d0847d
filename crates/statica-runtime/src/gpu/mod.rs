//! GPU accelerator built on wgpu.
//!
//! Device addresses map to `wgpu::Buffer`s in a registry. Each allocation
//! gets a persistent `MAP_READ` staging buffer of the same size so that
//! downloads never allocate. Plan layers are compiled to compute pipelines
//! once, at deserialization; every execution context owns its own
//! intermediate activation buffers.

mod shaders;

use crate::device::{
    Accelerator, Bindings, DevicePtr, ExecutionContext, INPUT_BINDING, OUTPUT_BINDING, PlanEngine,
};
use crate::error::{LoadError, Result, RuntimeError};
use parking_lot::Mutex;
use statica_plan::{Layer, Program, RUNTIME_VERSION};
use std::collections::HashMap;
use std::sync::Arc;

/// First address handed out by the registry.
const BASE_ADDR: u64 = 0x1_0000_0000;

struct GpuAllocation {
    buffer: wgpu::Buffer,
    staging: wgpu::Buffer,
    size: u64,
}

struct Registry {
    allocations: HashMap<u64, GpuAllocation>,
    next_addr: u64,
}

impl Registry {
    fn get(&self, ptr: DevicePtr) -> Result<&GpuAllocation> {
        self.allocations
            .get(&ptr.addr())
            .ok_or_else(|| RuntimeError::Execution(format!("Unknown device address {ptr}")))
    }
}

struct GpuShared {
    device: wgpu::Device,
    queue: wgpu::Queue,
    registry: Mutex<Registry>,
}

impl GpuShared {
    /// Block until all submitted work is done.
    fn wait(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| RuntimeError::Execution(format!("GPU poll failed: {e:?}")))?;
        Ok(())
    }
}

/// Accelerator that runs plans as wgpu compute pipelines.
///
/// # Example
/// ```no_run
/// # use statica_runtime::GpuAccelerator;
/// #[pollster::main]
/// async fn main() -> anyhow::Result<()> {
///     let gpu = GpuAccelerator::new().await?;
///     println!("Running on {}", gpu.adapter_info().name);
///     Ok(())
/// }
/// ```
pub struct GpuAccelerator {
    shared: Arc<GpuShared>,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuAccelerator {
    /// Initialize on the default high-performance adapter.
    ///
    /// # Errors
    /// Returns `RuntimeError::Init` if no adapter is found or the device
    /// can't be created.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RuntimeError::Init(format!("Failed to find suitable GPU adapter: {e}")))?;

        Self::with_adapter(&adapter).await
    }

    /// Initialize on a specific adapter.
    pub async fn with_adapter(adapter: &wgpu::Adapter) -> Result<Self> {
        let adapter_info = adapter.get_info();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|e| RuntimeError::Init(format!("Failed to create device: {e}")))?;

        tracing::info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "Initialized GPU accelerator"
        );

        Ok(Self {
            shared: Arc::new(GpuShared {
                device,
                queue,
                registry: Mutex::new(Registry {
                    allocations: HashMap::new(),
                    next_addr: BASE_ADDR,
                }),
            }),
            adapter_info,
        })
    }

    /// Blocking form of `new` for synchronous callers.
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Largest allocation the device accepts as a storage binding.
    fn max_allocation(&self) -> u64 {
        max_binding_bytes(&self.shared.device.limits())
    }
}

impl std::fmt::Debug for GpuAccelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuAccelerator")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .finish_non_exhaustive()
    }
}

/// Largest buffer that can also be bound whole as storage.
fn max_binding_bytes(limits: &wgpu::Limits) -> u64 {
    limits
        .max_buffer_size
        .min(u64::from(limits.max_storage_buffer_binding_size))
}

/// Check that every buffer the plan binds fits in `max_bytes`: the input,
/// each layer's output and each dense layer's weight and bias.
fn check_plan_fits(
    program: &Program,
    lens: &[usize],
    max_bytes: u64,
) -> std::result::Result<(), LoadError> {
    let fits = |what: &str, elements: usize| {
        let bytes = (elements as u64)
            .checked_mul(size_of::<f32>() as u64)
            .map(aligned);
        match bytes {
            Some(bytes) if bytes <= max_bytes => Ok(()),
            _ => Err(LoadError::Incompatible(format!(
                "{what} needs {elements} f32 values, device binding limit is {max_bytes} bytes"
            ))),
        }
    };

    fits("input", program.input_volume())?;
    for (i, (layer, &len)) in program.layers.iter().zip(lens).enumerate() {
        fits(&format!("layer {i} ({}) output", layer.kind()), len)?;
        if let Layer::Dense { weight, bias, .. } = layer {
            fits(&format!("layer {i} (dense) weight"), weight.len())?;
            fits(&format!("layer {i} (dense) bias"), bias.len())?;
        }
    }
    Ok(())
}

/// Round up to the copy alignment wgpu requires.
fn aligned(bytes: u64) -> u64 {
    bytes.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

fn check_copy_len(len: usize, size: u64, ptr: DevicePtr) -> Result<()> {
    if len as u64 > size {
        return Err(RuntimeError::Execution(format!(
            "Copy of {len} bytes exceeds allocation {ptr} of {size} bytes"
        )));
    }
    if len as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(RuntimeError::Execution(format!(
            "Copy of {len} bytes is not a multiple of {}",
            wgpu::COPY_BUFFER_ALIGNMENT
        )));
    }
    Ok(())
}

impl Accelerator for GpuAccelerator {
    fn name(&self) -> &str {
        &self.adapter_info.name
    }

    fn deserialize_plan(&self, blob: &[u8]) -> Result<Box<dyn PlanEngine>> {
        let decoded = statica_plan::decode(blob).map_err(LoadError::from)?;
        decoded
            .header
            .check_runtime(RUNTIME_VERSION)
            .map_err(LoadError::from)?;

        let engine = GpuPlanEngine::compile(Arc::clone(&self.shared), decoded.program)?;
        Ok(Box::new(engine))
    }

    fn alloc_device(&self, bytes: usize) -> Result<DevicePtr> {
        if bytes == 0 {
            return Err(RuntimeError::Allocation(
                "zero-sized device allocation".to_string(),
            ));
        }
        let size = aligned(bytes as u64);
        let max = self.max_allocation();
        if size > max {
            return Err(RuntimeError::Allocation(format!(
                "out of device memory: {bytes} bytes requested, device limit is {max}"
            )));
        }

        let device = &self.shared.device;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("device_buffer"),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("device_buffer_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut registry = self.shared.registry.lock();
        let addr = registry.next_addr;
        registry.next_addr += size;
        registry.allocations.insert(
            addr,
            GpuAllocation {
                buffer,
                staging,
                size,
            },
        );

        let ptr = DevicePtr::from_raw(addr);
        tracing::trace!(%ptr, bytes, "Allocated GPU buffer");
        Ok(ptr)
    }

    fn free_device(&self, ptr: DevicePtr) -> Result<()> {
        let allocation = self
            .shared
            .registry
            .lock()
            .allocations
            .remove(&ptr.addr())
            .ok_or_else(|| {
                RuntimeError::Execution(format!(
                    "Free of unknown or already freed device address {ptr}"
                ))
            })?;
        allocation.buffer.destroy();
        allocation.staging.destroy();
        tracing::trace!(%ptr, bytes = allocation.size, "Freed GPU buffer");
        Ok(())
    }

    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        {
            let registry = self.shared.registry.lock();
            let allocation = registry.get(dst)?;
            check_copy_len(src.len(), allocation.size, dst)?;
            self.shared.queue.write_buffer(&allocation.buffer, 0, src);
        }
        self.shared.queue.submit(std::iter::empty::<wgpu::CommandBuffer>());
        self.shared.wait()
    }

    fn copy_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        let registry = self.shared.registry.lock();
        let allocation = registry.get(src)?;
        check_copy_len(dst.len(), allocation.size, src)?;
        if dst.is_empty() {
            return Ok(());
        }
        let len = dst.len() as u64;

        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("download_copy"),
            });
        encoder.copy_buffer_to_buffer(&allocation.buffer, 0, &allocation.staging, 0, len);
        self.shared.queue.submit(std::iter::once(encoder.finish()));

        let slice = allocation.staging.slice(..len);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.shared.wait()?;

        receiver
            .recv()
            .map_err(|e| RuntimeError::Execution(format!("Map recv failed: {e}")))?
            .map_err(|e| RuntimeError::Execution(format!("Map failed: {e}")))?;

        dst.copy_from_slice(&slice.get_mapped_range());
        allocation.staging.unmap();
        Ok(())
    }
}

/// One compiled layer.
struct LayerPipeline {
    kind: &'static str,
    pipeline: wgpu::ComputePipeline,
    /// Read-only parameter buffers bound after input and output.
    params: Vec<wgpu::Buffer>,
    workgroups: u32,
    output_len: usize,
}

struct GpuPlanEngine {
    shared: Arc<GpuShared>,
    program: Program,
    layers: Arc<Vec<LayerPipeline>>,
}

impl GpuPlanEngine {
    #[tracing::instrument(skip_all, fields(plan = %program.name))]
    fn compile(shared: Arc<GpuShared>, program: Program) -> Result<Self> {
        let device = &shared.device;
        let max_groups = device.limits().max_compute_workgroups_per_dimension;
        let lens = program.activation_lens()?;
        check_plan_fits(&program, &lens, max_binding_bytes(&device.limits()))?;

        let mut layers = Vec::with_capacity(program.layers.len());
        let mut input_len = program.input_volume();
        for (layer, &output_len) in program.layers.iter().zip(&lens) {
            let kind = layer.kind();
            let wgsl = shaders::compile(kind, shaders::layer_defs(layer, input_len)?)?;
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kind),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(kind),
                layout: None,
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

            let workgroups = match layer {
                Layer::Softmax => 1,
                _ => (output_len as u64).div_ceil(u64::from(shaders::WORKGROUP_SIZE)) as u32,
            };
            if workgroups > max_groups {
                return Err(LoadError::Incompatible(format!(
                    "{kind} needs {workgroups} workgroups, device allows {max_groups}"
                ))
                .into());
            }

            let params = match layer {
                Layer::Dense { weight, bias, .. } => vec![
                    param_buffer(&shared, "dense_weight", weight),
                    param_buffer(&shared, "dense_bias", bias),
                ],
                _ => Vec::new(),
            };

            layers.push(LayerPipeline {
                kind,
                pipeline,
                params,
                workgroups,
                output_len,
            });
            input_len = output_len;
        }
        shared.queue.submit(std::iter::empty::<wgpu::CommandBuffer>());
        shared.wait()?;

        tracing::debug!(layers = layers.len(), "Compiled GPU pipelines");
        Ok(Self {
            shared,
            program,
            layers: Arc::new(layers),
        })
    }
}

fn param_buffer(shared: &GpuShared, label: &str, values: &[f32]) -> wgpu::Buffer {
    let buffer = shared.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: aligned(std::mem::size_of_val(values) as u64),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    shared
        .queue
        .write_buffer(&buffer, 0, bytemuck::cast_slice(values));
    buffer
}

impl PlanEngine for GpuPlanEngine {
    fn name(&self) -> &str {
        &self.program.name
    }

    fn create_context(&self) -> Result<Box<dyn ExecutionContext>> {
        // Every layer but the last writes an intermediate buffer.
        let count = self.layers.len().saturating_sub(1);
        let activations = self.layers[..count]
            .iter()
            .map(|layer| {
                self.shared.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("activation"),
                    size: aligned((layer.output_len * size_of::<f32>()) as u64),
                    usage: wgpu::BufferUsages::STORAGE,
                    mapped_at_creation: false,
                })
            })
            .collect();

        Ok(Box::new(GpuContext {
            shared: Arc::clone(&self.shared),
            layers: Arc::clone(&self.layers),
            activations,
            input_bytes: (self.program.input_volume() * size_of::<f32>()) as u64,
            output_bytes: (self.program.output_volume() * size_of::<f32>()) as u64,
        }))
    }
}

struct GpuContext {
    shared: Arc<GpuShared>,
    layers: Arc<Vec<LayerPipeline>>,
    activations: Vec<wgpu::Buffer>,
    input_bytes: u64,
    output_bytes: u64,
}

impl ExecutionContext for GpuContext {
    fn execute(&mut self, bindings: &Bindings) -> Result<()> {
        let device = &self.shared.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("plan_execution"),
        });

        {
            let registry = self.shared.registry.lock();
            let input = registry.get(bindings[INPUT_BINDING])?;
            let output = registry.get(bindings[OUTPUT_BINDING])?;
            if input.size < self.input_bytes || output.size < self.output_bytes {
                return Err(RuntimeError::Execution(format!(
                    "Bindings hold {}/{} bytes, plan needs {}/{}",
                    input.size, output.size, self.input_bytes, self.output_bytes
                )));
            }

            let last = self.layers.len() - 1;
            for (i, layer) in self.layers.iter().enumerate() {
                let src = if i == 0 {
                    &input.buffer
                } else {
                    &self.activations[i - 1]
                };
                let dst = if i == last {
                    &output.buffer
                } else {
                    &self.activations[i]
                };

                let mut entries = vec![
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: src.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: dst.as_entire_binding(),
                    },
                ];
                for (j, param) in layer.params.iter().enumerate() {
                    entries.push(wgpu::BindGroupEntry {
                        binding: 2 + j as u32,
                        resource: param.as_entire_binding(),
                    });
                }

                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(layer.kind),
                    layout: &layer.pipeline.get_bind_group_layout(0),
                    entries: &entries,
                });

                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(layer.kind),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&layer.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(layer.workgroups, 1, 1);
            }
        }

        self.shared.queue.submit(std::iter::once(encoder.finish()));
        self.shared.wait()
    }
}
