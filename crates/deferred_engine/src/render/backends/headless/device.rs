//! CPU-side implementation of `GpuDevice`

use std::collections::{HashMap, HashSet};

use slotmap::{new_key_type, Key, KeyData, SlotMap};

use super::compute::{self, SoftwareKernel};
use crate::render::api::{
    BackendResult, BarrierFlags, BufferHandle, ClearFlags, Extent2D, FramebufferDesc, FramebufferHandle,
    FramebufferStatus, FramebufferTarget, GpuDevice, GpuResource, MeshHandle, PolygonMode, ProgramDesc,
    ProgramHandle, ReleaseQueue, RenderbufferDesc, RenderbufferHandle, TextureDesc, TextureHandle,
    UniformValue,
};
use crate::render::primitives::Mesh;
use crate::render::RenderError;

new_key_type! {
    struct TextureKey;
    struct RenderbufferKey;
    struct FramebufferKey;
    struct BufferKey;
    struct MeshKey;
    struct ProgramKey;
}

fn key<K: From<KeyData>>(raw: u64) -> K {
    KeyData::from_ffi(raw).into()
}

fn raw<K: Key>(key: K) -> u64 {
    key.data().as_ffi()
}

fn invalid(what: &str, raw: u64) -> RenderError {
    RenderError::InvalidHandle(format!("{what} {raw:#x} does not exist"))
}

/// One recorded device command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `bind_framebuffer`
    BindFramebuffer(FramebufferTarget),
    /// `set_viewport`
    SetViewport(Extent2D),
    /// `clear` of the framebuffer bound at the time
    Clear {
        /// Framebuffer that was cleared
        target: FramebufferTarget,
        /// Cleared buffers
        flags: ClearFlags,
    },
    /// `set_polygon_mode`
    SetPolygonMode(PolygonMode),
    /// `set_face_culling`
    SetFaceCulling(bool),
    /// `use_program`
    UseProgram(ProgramHandle),
    /// `set_uniform`
    SetUniform {
        /// Program whose uniform changed
        program: ProgramHandle,
        /// Uniform name
        name: String,
    },
    /// `bind_texture`
    BindTexture {
        /// Sampler unit
        unit: u32,
        /// Bound texture
        texture: TextureHandle,
    },
    /// `bind_storage_buffer`
    BindStorage {
        /// Binding point
        binding: u32,
        /// Bound buffer
        buffer: BufferHandle,
    },
    /// `draw_fullscreen_quad`
    DrawFullscreen {
        /// Program used
        program: ProgramHandle,
        /// Framebuffer drawn into
        target: FramebufferTarget,
    },
    /// `draw_mesh` and `draw_mesh_instanced`
    DrawMesh {
        /// Program used
        program: ProgramHandle,
        /// Mesh drawn
        mesh: MeshHandle,
        /// Instance count, 1 for non-instanced draws
        instances: u32,
    },
    /// `dispatch_compute`
    Dispatch {
        /// Compute program
        program: ProgramHandle,
        /// Workgroup counts
        groups: [u32; 3],
    },
    /// `memory_barrier`
    Barrier(BarrierFlags),
    /// `blit_depth`
    BlitDepth {
        /// Source framebuffer
        src: FramebufferHandle,
        /// Destination
        dst: FramebufferTarget,
    },
    /// `write_buffer`
    WriteBuffer {
        /// Written buffer
        buffer: BufferHandle,
        /// New size in bytes
        len: usize,
    },
    /// `read_buffer`
    ReadBuffer(BufferHandle),
}

/// Creation or destruction of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Resource created
    Created(GpuResource),
    /// Resource destroyed
    Destroyed(GpuResource),
}

/// A storage buffer access not ordered after an earlier shader write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHazard {
    /// Binding the access went through
    pub binding: u32,
    /// Buffer accessed
    pub buffer: BufferHandle,
    /// Program (or "readback") that performed the access
    pub accessor: String,
}

#[derive(Debug)]
struct TextureState {
    desc: TextureDesc,
    version: u64,
}

#[derive(Debug)]
struct ProgramState {
    desc: ProgramDesc,
    uniforms: HashMap<String, UniformValue>,
    kernel: Option<SoftwareKernel>,
}

#[derive(Debug)]
struct MeshState {
    vertex_count: usize,
    index_count: usize,
}

/// Software device for tests and headless runs
#[derive(Debug)]
pub struct HeadlessDevice {
    surface: Extent2D,
    textures: SlotMap<TextureKey, TextureState>,
    renderbuffers: SlotMap<RenderbufferKey, RenderbufferDesc>,
    framebuffers: SlotMap<FramebufferKey, FramebufferDesc>,
    buffers: SlotMap<BufferKey, Vec<u8>>,
    meshes: SlotMap<MeshKey, MeshState>,
    programs: SlotMap<ProgramKey, ProgramState>,

    bound_framebuffer: FramebufferTarget,
    current_program: Option<ProgramHandle>,
    viewport: Extent2D,
    polygon_mode: PolygonMode,
    face_culling: bool,
    texture_units: HashMap<u32, TextureHandle>,
    storage_bindings: HashMap<u32, BufferHandle>,

    unsynced_writes: HashSet<BufferHandle>,
    hazards: Vec<StorageHazard>,
    commands: Vec<Command>,
    lifecycle: Vec<LifecycleEvent>,
    release: ReleaseQueue,
}

impl HeadlessDevice {
    /// Create a device with a surface of `surface` pixels
    pub fn new(surface: Extent2D) -> Self {
        log::info!("Headless device created with a {}x{} surface", surface.width, surface.height);
        Self {
            surface,
            textures: SlotMap::with_key(),
            renderbuffers: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            bound_framebuffer: FramebufferTarget::Default,
            current_program: None,
            viewport: surface,
            polygon_mode: PolygonMode::Fill,
            face_culling: false,
            texture_units: HashMap::new(),
            storage_bindings: HashMap::new(),
            unsynced_writes: HashSet::new(),
            hazards: Vec::new(),
            commands: Vec::new(),
            lifecycle: Vec::new(),
            release: ReleaseQueue::new(),
        }
    }

    /// Change the surface size, as a window resize would
    pub fn resize(&mut self, surface: Extent2D) {
        log::debug!("Headless surface resized to {}x{}", surface.width, surface.height);
        self.surface = surface;
    }

    /// Commands recorded so far
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Take the recorded commands, leaving the log empty
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Resource creations and destructions in order
    pub fn lifecycle(&self) -> &[LifecycleEvent] {
        &self.lifecycle
    }

    /// Unsynchronised storage accesses detected so far
    pub fn hazards(&self) -> &[StorageHazard] {
        &self.hazards
    }

    /// Number of live resources of every kind
    pub fn live_resource_count(&self) -> usize {
        self.textures.len()
            + self.renderbuffers.len()
            + self.framebuffers.len()
            + self.buffers.len()
            + self.meshes.len()
            + self.programs.len()
    }

    /// Description of a live texture
    pub fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(key::<TextureKey>(texture.0)).map(|t| t.desc)
    }

    /// Number of clears and draws that have written into a texture
    pub fn texture_version(&self, texture: TextureHandle) -> Option<u64> {
        self.textures.get(key::<TextureKey>(texture.0)).map(|t| t.version)
    }

    /// Current value of a program uniform
    pub fn uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        self.programs
            .get(key::<ProgramKey>(program.0))
            .and_then(|p| p.uniforms.get(name).copied())
    }

    /// Label of a live program
    pub fn program_label(&self, program: ProgramHandle) -> Option<&str> {
        self.programs.get(key::<ProgramKey>(program.0)).map(|p| p.desc.label.as_str())
    }

    /// Currently bound framebuffer
    pub fn bound_framebuffer(&self) -> FramebufferTarget {
        self.bound_framebuffer
    }

    /// Current viewport
    pub fn viewport(&self) -> Extent2D {
        self.viewport
    }

    /// Current fill mode
    pub fn polygon_mode(&self) -> PolygonMode {
        self.polygon_mode
    }

    /// Whether back-face culling is enabled
    pub fn face_culling(&self) -> bool {
        self.face_culling
    }

    /// Buffer attached to a storage binding
    pub fn storage_binding(&self, binding: u32) -> Option<BufferHandle> {
        self.storage_bindings.get(&binding).copied()
    }

    /// Vertex and index counts of a live mesh
    pub fn mesh_counts(&self, mesh: MeshHandle) -> Option<(usize, usize)> {
        self.meshes
            .get(key::<MeshKey>(mesh.0))
            .map(|m| (m.vertex_count, m.index_count))
    }

    fn created(&mut self, resource: GpuResource) {
        log::trace!("Created {resource:?}");
        self.lifecycle.push(LifecycleEvent::Created(resource));
    }

    fn destroyed(&mut self, resource: GpuResource) {
        log::trace!("Destroyed {resource:?}");
        self.lifecycle.push(LifecycleEvent::Destroyed(resource));
    }

    fn current_program(&self) -> BackendResult<(ProgramHandle, &ProgramState)> {
        let handle = self
            .current_program
            .ok_or_else(|| RenderError::BackendError("no program in use".to_string()))?;
        let state = self
            .programs
            .get(key::<ProgramKey>(handle.0))
            .ok_or_else(|| invalid("program", handle.0))?;
        Ok((handle, state))
    }

    /// Check the current program's storage accesses against pending writes,
    /// then record its own writes as pending
    fn track_storage(&mut self, program: ProgramHandle) -> BackendResult<()> {
        let state = self
            .programs
            .get(key::<ProgramKey>(program.0))
            .ok_or_else(|| invalid("program", program.0))?;

        let mut writes = Vec::new();
        for usage in &state.desc.storage {
            let buffer = self.storage_bindings.get(&usage.binding).copied().ok_or_else(|| {
                RenderError::BackendError(format!(
                    "{} needs a buffer at storage binding {}",
                    state.desc.label, usage.binding
                ))
            })?;
            if self.unsynced_writes.contains(&buffer) {
                log::warn!(
                    "Storage hazard: {} accesses binding {} before a barrier",
                    state.desc.label,
                    usage.binding
                );
                self.hazards.push(StorageHazard {
                    binding: usage.binding,
                    buffer,
                    accessor: state.desc.label.clone(),
                });
            }
            if usage.access.writes() {
                writes.push(buffer);
            }
        }
        self.unsynced_writes.extend(writes);
        Ok(())
    }

    fn touch_bound_attachments(&mut self) {
        let FramebufferTarget::Offscreen(handle) = self.bound_framebuffer else {
            return;
        };
        let Some(desc) = self.framebuffers.get(key::<FramebufferKey>(handle.0)) else {
            return;
        };
        for texture in &desc.color_attachments {
            if let Some(state) = self.textures.get_mut(key::<TextureKey>(texture.0)) {
                state.version += 1;
            }
        }
    }

    fn run_kernel(&mut self, kernel: SoftwareKernel, program: ProgramHandle, groups: [u32; 3]) -> BackendResult<()> {
        let uniforms = &self
            .programs
            .get(key::<ProgramKey>(program.0))
            .ok_or_else(|| invalid("program", program.0))?
            .uniforms;

        match kernel {
            SoftwareKernel::ClusterBounds => {
                let clusters = key_of_binding(&self.storage_bindings, &self.buffers, 1)?;
                compute::run_cluster_bounds(uniforms, groups, &mut self.buffers[clusters])
            }
            SoftwareKernel::ClusterLightCull => {
                let clusters = key_of_binding(&self.storage_bindings, &self.buffers, 1)?;
                let lights = key_of_binding(&self.storage_bindings, &self.buffers, 2)?;
                let stats = key_of_binding(&self.storage_bindings, &self.buffers, 3)?;
                if clusters == stats || clusters == lights || lights == stats {
                    return Err(RenderError::BackendError(
                        "light cull bindings 1, 2 and 3 must be distinct buffers".to_string(),
                    ));
                }

                let light_data = self.buffers[lights].clone();
                let mut stats_data = std::mem::take(&mut self.buffers[stats]);
                let result = compute::run_light_cull(
                    uniforms,
                    groups,
                    &mut self.buffers[clusters],
                    &light_data,
                    &mut stats_data,
                );
                self.buffers[stats] = stats_data;
                result
            }
        }
    }
}

fn key_of_binding(
    bindings: &HashMap<u32, BufferHandle>,
    buffers: &SlotMap<BufferKey, Vec<u8>>,
    binding: u32,
) -> BackendResult<BufferKey> {
    let buffer = bindings
        .get(&binding)
        .ok_or_else(|| RenderError::BackendError(format!("no buffer at storage binding {binding}")))?;
    let k = key::<BufferKey>(buffer.0);
    if buffers.contains_key(k) {
        Ok(k)
    } else {
        Err(invalid("buffer", buffer.0))
    }
}

impl GpuDevice for HeadlessDevice {
    fn surface_extent(&self) -> Extent2D {
        self.surface
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> BackendResult<TextureHandle> {
        if let Some(data) = data {
            let expected =
                desc.extent.width as usize * desc.extent.height as usize * desc.format.upload_texel_size();
            if data.len() != expected {
                return Err(RenderError::ResourceCreationFailed(format!(
                    "texture upload of {} bytes, expected {expected}",
                    data.len()
                )));
            }
        }
        let handle = TextureHandle(raw(self.textures.insert(TextureState {
            desc: *desc,
            version: u64::from(data.is_some()),
        })));
        self.created(GpuResource::Texture(handle));
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(key::<TextureKey>(texture.0)).is_some() {
            self.texture_units.retain(|_, bound| *bound != texture);
            self.destroyed(GpuResource::Texture(texture));
        }
    }

    fn create_renderbuffer(&mut self, desc: &RenderbufferDesc) -> BackendResult<RenderbufferHandle> {
        let handle = RenderbufferHandle(raw(self.renderbuffers.insert(*desc)));
        self.created(GpuResource::Renderbuffer(handle));
        Ok(handle)
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if self.renderbuffers.remove(key::<RenderbufferKey>(renderbuffer.0)).is_some() {
            self.destroyed(GpuResource::Renderbuffer(renderbuffer));
        }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> BackendResult<FramebufferHandle> {
        for texture in &desc.color_attachments {
            if !self.textures.contains_key(key::<TextureKey>(texture.0)) {
                return Err(RenderError::ResourceCreationFailed(format!(
                    "framebuffer attachment {:#x} does not exist",
                    texture.0
                )));
            }
        }
        if let Some(rbo) = desc.depth_stencil {
            if !self.renderbuffers.contains_key(key::<RenderbufferKey>(rbo.0)) {
                return Err(RenderError::ResourceCreationFailed(format!(
                    "depth attachment {:#x} does not exist",
                    rbo.0
                )));
            }
        }
        let handle = FramebufferHandle(raw(self.framebuffers.insert(desc.clone())));
        self.created(GpuResource::Framebuffer(handle));
        Ok(handle)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(key::<FramebufferKey>(framebuffer.0)).is_some() {
            if self.bound_framebuffer == FramebufferTarget::Offscreen(framebuffer) {
                self.bound_framebuffer = FramebufferTarget::Default;
            }
            self.destroyed(GpuResource::Framebuffer(framebuffer));
        }
    }

    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> BackendResult<FramebufferStatus> {
        let desc = self
            .framebuffers
            .get(key::<FramebufferKey>(framebuffer.0))
            .ok_or_else(|| invalid("framebuffer", framebuffer.0))?;

        let mut extents = Vec::new();
        for texture in &desc.color_attachments {
            match self.textures.get(key::<TextureKey>(texture.0)) {
                Some(state) => extents.push(state.desc.extent),
                None => return Ok(FramebufferStatus::IncompleteAttachment),
            }
        }
        if let Some(rbo) = desc.depth_stencil {
            match self.renderbuffers.get(key::<RenderbufferKey>(rbo.0)) {
                Some(state) => extents.push(state.extent),
                None => return Ok(FramebufferStatus::IncompleteAttachment),
            }
        }

        let Some(first) = extents.first().copied() else {
            return Ok(FramebufferStatus::MissingAttachment);
        };
        if extents.iter().any(|e| e.is_empty()) {
            return Ok(FramebufferStatus::IncompleteAttachment);
        }
        if extents.iter().any(|&e| e != first) {
            return Ok(FramebufferStatus::IncompleteDimensions);
        }
        Ok(FramebufferStatus::Complete)
    }

    fn create_buffer(&mut self, size: usize) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(raw(self.buffers.insert(vec![0; size])));
        self.created(GpuResource::Buffer(handle));
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(key::<BufferKey>(buffer.0)).is_some() {
            self.storage_bindings.retain(|_, bound| *bound != buffer);
            self.unsynced_writes.remove(&buffer);
            self.destroyed(GpuResource::Buffer(buffer));
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, data: &[u8]) -> BackendResult<()> {
        let contents = self
            .buffers
            .get_mut(key::<BufferKey>(buffer.0))
            .ok_or_else(|| invalid("buffer", buffer.0))?;
        contents.clear();
        contents.extend_from_slice(data);
        // Respecifying storage orders after prior shader writes
        self.unsynced_writes.remove(&buffer);
        self.commands.push(Command::WriteBuffer { buffer, len: data.len() });
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> BackendResult<Vec<u8>> {
        let contents = self
            .buffers
            .get(key::<BufferKey>(buffer.0))
            .ok_or_else(|| invalid("buffer", buffer.0))?
            .clone();
        if self.unsynced_writes.contains(&buffer) {
            log::warn!("Storage hazard: buffer {:#x} read back before a barrier", buffer.0);
            let binding = self
                .storage_bindings
                .iter()
                .find_map(|(&binding, &bound)| (bound == buffer).then_some(binding))
                .unwrap_or(u32::MAX);
            self.hazards.push(StorageHazard {
                binding,
                buffer,
                accessor: "readback".to_string(),
            });
        }
        self.commands.push(Command::ReadBuffer(buffer));
        Ok(contents)
    }

    fn bind_storage_buffer(&mut self, binding: u32, buffer: BufferHandle) -> BackendResult<()> {
        if !self.buffers.contains_key(key::<BufferKey>(buffer.0)) {
            return Err(invalid("buffer", buffer.0));
        }
        self.storage_bindings.insert(binding, buffer);
        self.commands.push(Command::BindStorage { binding, buffer });
        Ok(())
    }

    fn create_mesh(&mut self, mesh: &Mesh) -> BackendResult<MeshHandle> {
        mesh.validate()?;
        let handle = MeshHandle(raw(self.meshes.insert(MeshState {
            vertex_count: mesh.vertices.len(),
            index_count: mesh.indices.len(),
        })));
        self.created(GpuResource::Mesh(handle));
        Ok(handle)
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        if self.meshes.remove(key::<MeshKey>(mesh.0)).is_some() {
            self.destroyed(GpuResource::Mesh(mesh));
        }
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> BackendResult<ProgramHandle> {
        if desc.stages.is_empty() {
            return Err(RenderError::ResourceCreationFailed(format!("program {} has no stages", desc.label)));
        }
        let kernel = SoftwareKernel::for_program(desc);
        if desc.is_compute() && kernel.is_none() {
            log::warn!("Compute program {} has no software kernel; dispatches will be no-ops", desc.label);
        }
        let handle = ProgramHandle(raw(self.programs.insert(ProgramState {
            desc: desc.clone(),
            uniforms: HashMap::new(),
            kernel,
        })));
        self.created(GpuResource::Program(handle));
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(key::<ProgramKey>(program.0)).is_some() {
            if self.current_program == Some(program) {
                self.current_program = None;
            }
            self.destroyed(GpuResource::Program(program));
        }
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget) -> BackendResult<()> {
        if let FramebufferTarget::Offscreen(handle) = target {
            if !self.framebuffers.contains_key(key::<FramebufferKey>(handle.0)) {
                return Err(invalid("framebuffer", handle.0));
            }
        }
        self.bound_framebuffer = target;
        self.commands.push(Command::BindFramebuffer(target));
        Ok(())
    }

    fn set_viewport(&mut self, extent: Extent2D) {
        self.viewport = extent;
        self.commands.push(Command::SetViewport(extent));
    }

    fn clear(&mut self, _color: [f32; 4], flags: ClearFlags) {
        if flags.contains(ClearFlags::COLOR) {
            self.touch_bound_attachments();
        }
        self.commands.push(Command::Clear {
            target: self.bound_framebuffer,
            flags,
        });
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.polygon_mode = mode;
        self.commands.push(Command::SetPolygonMode(mode));
    }

    fn set_face_culling(&mut self, enabled: bool) {
        self.face_culling = enabled;
        self.commands.push(Command::SetFaceCulling(enabled));
    }

    fn use_program(&mut self, program: ProgramHandle) -> BackendResult<()> {
        if !self.programs.contains_key(key::<ProgramKey>(program.0)) {
            return Err(invalid("program", program.0));
        }
        self.current_program = Some(program);
        self.commands.push(Command::UseProgram(program));
        Ok(())
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue) -> BackendResult<()> {
        let state = self
            .programs
            .get_mut(key::<ProgramKey>(program.0))
            .ok_or_else(|| invalid("program", program.0))?;
        state.uniforms.insert(name.to_string(), value);
        self.commands.push(Command::SetUniform {
            program,
            name: name.to_string(),
        });
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> BackendResult<()> {
        if !self.textures.contains_key(key::<TextureKey>(texture.0)) {
            return Err(invalid("texture", texture.0));
        }
        self.texture_units.insert(unit, texture);
        self.commands.push(Command::BindTexture { unit, texture });
        Ok(())
    }

    fn draw_fullscreen_quad(&mut self) -> BackendResult<()> {
        let (program, state) = self.current_program()?;
        if state.desc.is_compute() {
            return Err(RenderError::BackendError(format!("cannot draw with compute program {}", state.desc.label)));
        }
        self.track_storage(program)?;
        self.touch_bound_attachments();
        self.commands.push(Command::DrawFullscreen {
            program,
            target: self.bound_framebuffer,
        });
        Ok(())
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) -> BackendResult<()> {
        self.draw_mesh_instanced(mesh, 1)
    }

    fn draw_mesh_instanced(&mut self, mesh: MeshHandle, instances: u32) -> BackendResult<()> {
        if !self.meshes.contains_key(key::<MeshKey>(mesh.0)) {
            return Err(invalid("mesh", mesh.0));
        }
        let (program, state) = self.current_program()?;
        if state.desc.is_compute() {
            return Err(RenderError::BackendError(format!("cannot draw with compute program {}", state.desc.label)));
        }
        self.track_storage(program)?;
        self.touch_bound_attachments();
        self.commands.push(Command::DrawMesh { program, mesh, instances });
        Ok(())
    }

    fn dispatch_compute(&mut self, groups: [u32; 3]) -> BackendResult<()> {
        let (program, state) = self.current_program()?;
        if !state.desc.is_compute() {
            return Err(RenderError::BackendError(format!("{} is not a compute program", state.desc.label)));
        }
        let kernel = state.kernel;
        self.track_storage(program)?;
        self.commands.push(Command::Dispatch { program, groups });

        match kernel {
            Some(kernel) => self.run_kernel(kernel, program, groups),
            None => Ok(()),
        }
    }

    fn memory_barrier(&mut self, flags: BarrierFlags) {
        if flags.contains(BarrierFlags::SHADER_STORAGE) {
            self.unsynced_writes.clear();
        }
        self.commands.push(Command::Barrier(flags));
    }

    fn blit_depth(
        &mut self,
        src: FramebufferHandle,
        _src_extent: Extent2D,
        dst: FramebufferTarget,
        _dst_extent: Extent2D,
    ) -> BackendResult<()> {
        let desc = self
            .framebuffers
            .get(key::<FramebufferKey>(src.0))
            .ok_or_else(|| invalid("framebuffer", src.0))?;
        if desc.depth_stencil.is_none() {
            return Err(RenderError::BackendError("blit source has no depth attachment".to_string()));
        }
        if let FramebufferTarget::Offscreen(handle) = dst {
            if !self.framebuffers.contains_key(key::<FramebufferKey>(handle.0)) {
                return Err(invalid("framebuffer", handle.0));
            }
        }
        self.commands.push(Command::BlitDepth { src, dst });
        Ok(())
    }

    fn release_queue(&self) -> ReleaseQueue {
        self.release.clone()
    }
}
