//! The `GpuDevice` trait and the value types that cross it

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::api::release::{GpuResource, ReleaseQueue};
use crate::render::primitives::Mesh;
use crate::render::RenderError;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Handle to a 2D texture stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to a renderbuffer (depth/stencil storage that is never sampled)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferHandle(pub u64);

/// Handle to an offscreen framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u64);

/// Handle to a shader storage buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to an uploaded mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent2D {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Extent2D {
    /// Create an extent
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height; 1.0 for empty extents
    pub fn aspect(self) -> f32 {
        if self.is_empty() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// As a `[width, height]` pair, the layout of a `uvec2` uniform
    pub const fn to_array(self) -> [u32; 2] {
        [self.width, self.height]
    }
}

impl From<(u32, u32)> for Extent2D {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Texel formats used by the pipeline's textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Four half-float channels (positions, normals, HDR colour, SSAO noise)
    Rgba16F,
    /// Four 8-bit normalized channels (albedo + specular)
    Rgba8,
    /// One half-float channel (ambient occlusion)
    R16F,
}

impl TextureFormat {
    /// Number of channels
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgba16F | Self::Rgba8 => 4,
            Self::R16F => 1,
        }
    }

    /// Bytes per texel of initial upload data
    ///
    /// Float formats are uploaded as `f32` per channel and converted by the
    /// backend; `Rgba8` is uploaded as bytes.
    pub const fn upload_texel_size(self) -> usize {
        match self {
            Self::Rgba16F | Self::R16F => self.channels() * 4,
            Self::Rgba8 => 4,
        }
    }
}

/// Texture minification/magnification filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    /// Clamp to the edge texel
    ClampToEdge,
    /// Tile
    Repeat,
}

/// Description of a 2D texture without mipmaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    /// Size in texels
    pub extent: Extent2D,
    /// Texel format
    pub format: TextureFormat,
    /// Sampling filter
    pub filter: FilterMode,
    /// Wrapping mode on both axes
    pub wrap: WrapMode,
}

impl TextureDesc {
    /// Nearest-filtered, clamp-to-edge attachment texture
    pub const fn attachment(extent: Extent2D, format: TextureFormat) -> Self {
        Self {
            extent,
            format,
            filter: FilterMode::Nearest,
            wrap: WrapMode::ClampToEdge,
        }
    }
}

/// Renderbuffer storage formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderbufferFormat {
    /// Packed 24-bit depth and 8-bit stencil
    Depth24Stencil8,
}

/// Description of a renderbuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferDesc {
    /// Size in pixels
    pub extent: Extent2D,
    /// Storage format
    pub format: RenderbufferFormat,
}

/// Attachments of an offscreen framebuffer
///
/// Colour attachments are bound to draw buffers in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FramebufferDesc {
    /// Colour attachments, one per shader output
    pub color_attachments: Vec<TextureHandle>,
    /// Optional combined depth/stencil attachment
    pub depth_stencil: Option<RenderbufferHandle>,
}

/// Result of a framebuffer completeness check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferStatus {
    /// Ready to render into
    Complete,
    /// An attachment has a zero-sized image
    IncompleteAttachment,
    /// The framebuffer has no attachments at all
    MissingAttachment,
    /// Attachments disagree on their dimensions
    IncompleteDimensions,
}

impl FramebufferStatus {
    /// True for [`FramebufferStatus::Complete`]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Where draws land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    /// The presentable surface
    Default,
    /// An offscreen framebuffer
    Offscreen(FramebufferHandle),
}

/// Rasterization fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    /// Filled triangles
    Fill,
    /// Wireframe
    Line,
}

bitflags! {
    /// Buffers cleared by [`GpuDevice::clear`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Colour attachments
        const COLOR = 1 << 0;
        /// Depth attachment
        const DEPTH = 1 << 1;
        /// Stencil attachment
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    /// Memory made visible by [`GpuDevice::memory_barrier`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BarrierFlags: u32 {
        /// Shader storage buffer writes
        const SHADER_STORAGE = 1 << 0;
        /// Uniform buffer writes
        const UNIFORM = 1 << 1;
        /// Writes later fetched through samplers
        const TEXTURE_FETCH = 1 << 2;
        /// Writes later read as framebuffer attachments
        const FRAMEBUFFER = 1 << 3;
        /// Every kind of memory access
        const ALL = Self::SHADER_STORAGE.bits()
            | Self::UNIFORM.bits()
            | Self::TEXTURE_FETCH.bits()
            | Self::FRAMEBUFFER.bits();
    }
}

/// Value assigned to a named program uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// `int` or sampler unit
    Int(i32),
    /// `uint`
    UInt(u32),
    /// `float`
    Float(f32),
    /// `bool`
    Bool(bool),
    /// `vec3`
    Vec3(Vec3),
    /// `vec4`
    Vec4(Vec4),
    /// `uvec2`
    UVec2([u32; 2]),
    /// `uvec3`
    UVec3([u32; 3]),
    /// `mat4`, column-major
    Mat4(Mat4),
}

/// Programmable pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
    /// Compute shader
    Compute,
}

/// One shader source file of a program
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    /// Stage the file is compiled for
    pub stage: ShaderStage,
    /// Path of the GLSL source
    pub path: PathBuf,
}

/// How a program touches a storage buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageAccess {
    /// Only reads
    Read,
    /// Only writes
    Write,
    /// Reads and writes
    ReadWrite,
}

impl StorageAccess {
    /// True for `Read` and `ReadWrite`
    pub const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// True for `Write` and `ReadWrite`
    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Storage binding declared by a program's interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageUsage {
    /// Binding point
    pub binding: u32,
    /// Access pattern
    pub access: StorageAccess,
}

/// Everything needed to build a program
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramDesc {
    /// Debug label
    pub label: String,
    /// Source files per stage
    pub stages: Vec<ShaderSource>,
    /// Storage buffers the program reads or writes
    pub storage: Vec<StorageUsage>,
}

impl ProgramDesc {
    /// Path of the source compiled for `stage`
    pub fn stage_path(&self, stage: ShaderStage) -> Option<&Path> {
        self.stages
            .iter()
            .find(|source| source.stage == stage)
            .map(|source| source.path.as_path())
    }

    /// True for compute programs
    pub fn is_compute(&self) -> bool {
        self.stage_path(ShaderStage::Compute).is_some()
    }
}

/// Graphics device abstraction
///
/// Mirrors the small subset of an OpenGL 4.3 style device the deferred
/// renderer needs. Binding state (framebuffer, program, textures, storage
/// buffers) is global to the device and persists until rebound.
///
/// Destroying a handle that is already gone is a no-op; using one in any
/// other call yields [`RenderError::InvalidHandle`].
pub trait GpuDevice {
    /// Current size of the presentable surface
    fn surface_extent(&self) -> Extent2D;

    /// Create a texture, optionally uploading initial texel data
    ///
    /// `data` must hold `width · height` texels laid out as described by
    /// [`TextureFormat::upload_texel_size`].
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> BackendResult<TextureHandle>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Create a renderbuffer
    fn create_renderbuffer(&mut self, desc: &RenderbufferDesc) -> BackendResult<RenderbufferHandle>;

    /// Destroy a renderbuffer
    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    /// Create a framebuffer from existing attachments
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> BackendResult<FramebufferHandle>;

    /// Destroy a framebuffer; its attachments are left alone
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Completeness of a framebuffer
    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> BackendResult<FramebufferStatus>;

    /// Create a zero-filled storage buffer of `size` bytes
    fn create_buffer(&mut self, size: usize) -> BackendResult<BufferHandle>;

    /// Destroy a storage buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Replace the whole contents (and size) of a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, data: &[u8]) -> BackendResult<()>;

    /// Read the whole contents of a buffer back to the CPU
    fn read_buffer(&mut self, buffer: BufferHandle) -> BackendResult<Vec<u8>>;

    /// Attach a buffer to a storage binding point
    fn bind_storage_buffer(&mut self, binding: u32, buffer: BufferHandle) -> BackendResult<()>;

    /// Upload a mesh
    fn create_mesh(&mut self, mesh: &Mesh) -> BackendResult<MeshHandle>;

    /// Destroy a mesh
    fn destroy_mesh(&mut self, mesh: MeshHandle);

    /// Compile and link a program
    fn create_program(&mut self, desc: &ProgramDesc) -> BackendResult<ProgramHandle>;

    /// Destroy a program
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Route subsequent clears and draws
    fn bind_framebuffer(&mut self, target: FramebufferTarget) -> BackendResult<()>;

    /// Set the viewport rectangle, anchored at the origin
    fn set_viewport(&mut self, extent: Extent2D);

    /// Clear the bound framebuffer
    fn clear(&mut self, color: [f32; 4], flags: ClearFlags);

    /// Set the rasterization fill mode
    fn set_polygon_mode(&mut self, mode: PolygonMode);

    /// Enable or disable back-face culling
    fn set_face_culling(&mut self, enabled: bool);

    /// Make a program current
    fn use_program(&mut self, program: ProgramHandle) -> BackendResult<()>;

    /// Assign a named uniform of a program
    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue) -> BackendResult<()>;

    /// Bind a texture to a sampler unit
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> BackendResult<()>;

    /// Draw a screen-covering quad with the current program
    fn draw_fullscreen_quad(&mut self) -> BackendResult<()>;

    /// Draw a mesh with the current program
    fn draw_mesh(&mut self, mesh: MeshHandle) -> BackendResult<()>;

    /// Draw `instances` copies of a mesh with the current program
    fn draw_mesh_instanced(&mut self, mesh: MeshHandle, instances: u32) -> BackendResult<()>;

    /// Dispatch the current compute program
    fn dispatch_compute(&mut self, groups: [u32; 3]) -> BackendResult<()>;

    /// Order prior shader writes before subsequent accesses
    fn memory_barrier(&mut self, flags: BarrierFlags);

    /// Copy the depth of `src` into `dst`, scaling between the extents
    fn blit_depth(
        &mut self,
        src: FramebufferHandle,
        src_extent: Extent2D,
        dst: FramebufferTarget,
        dst_extent: Extent2D,
    ) -> BackendResult<()>;

    /// Queue that RAII wrappers push released resources onto
    fn release_queue(&self) -> ReleaseQueue;

    /// Destroy everything queued for release; returns how many were destroyed
    fn collect_released(&mut self) -> usize {
        let released = self.release_queue().drain();
        for resource in &released {
            match *resource {
                GpuResource::Framebuffer(handle) => self.destroy_framebuffer(handle),
                GpuResource::Texture(handle) => self.destroy_texture(handle),
                GpuResource::Renderbuffer(handle) => self.destroy_renderbuffer(handle),
                GpuResource::Buffer(handle) => self.destroy_buffer(handle),
                GpuResource::Mesh(handle) => self.destroy_mesh(handle),
                GpuResource::Program(handle) => self.destroy_program(handle),
            }
        }
        if !released.is_empty() {
            log::trace!("Destroyed {} released GPU resources", released.len());
        }
        released.len()
    }
}
