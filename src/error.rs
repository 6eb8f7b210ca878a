// Error taxonomy for the ray tracer core
//
// Every failure is raised where it is detected and propagated with `?`.
// Nothing below is retried; the frame loop aborts on the first error.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Top-level error returned by every component of the renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitError),

    #[error("resource creation failed: {0}")]
    ResourceCreation(#[from] ResourceError),

    #[error("failed to create {what}: {result}")]
    SyncPrimitive {
        what: &'static str,
        result: vk::Result,
    },

    #[error("{operation} failed: {result}")]
    Submission {
        operation: &'static str,
        result: vk::Result,
    },
}

impl RenderError {
    pub fn submission(operation: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Submission { operation, result }
    }

    pub fn sync_primitive(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::SyncPrimitive { what, result }
    }
}

/// Instance, surface, device and swapchain setup failures.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to load the Vulkan library: {0}")]
    LibraryLoad(#[from] ash::LoadingError),

    #[error("validation layer {0} was requested but is not available")]
    MissingValidationLayer(String),

    #[error("failed to find GPUs with Vulkan support")]
    NoDeviceFound,

    #[error("failed to find a GPU with compute, presentation and the required extensions")]
    NoSuitableDevice,

    #[error("swapchain images do not support storage usage (supported: {0:?})")]
    UnsupportedSwapchainUsage(vk::ImageUsageFlags),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("failed to {what}: {result}")]
    Vulkan {
        what: &'static str,
        result: vk::Result,
    },
}

impl InitError {
    pub fn vulkan(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vulkan { what, result }
    }
}

/// Buffer, image, memory, descriptor, shader and pipeline creation failures.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to create {what} buffer: {result}")]
    BufferCreation {
        what: &'static str,
        result: vk::Result,
    },

    #[error("refusing to create zero-sized {0} buffer")]
    EmptyBuffer(&'static str),

    #[error("failed to create {what}: {result}")]
    ImageCreation {
        what: &'static str,
        result: vk::Result,
    },

    #[error("no memory type in {type_bits:#b} provides {flags:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("failed to allocate memory for {what}: {result}")]
    MemoryAllocation {
        what: &'static str,
        result: vk::Result,
    },

    #[error("failed to bind memory to {what}: {result}")]
    MemoryBind {
        what: &'static str,
        result: vk::Result,
    },

    #[error("failed to map memory: {0}")]
    MemoryMap(vk::Result),

    #[error("write of {len} bytes exceeds mapped region of {capacity} bytes")]
    WriteOutOfBounds { len: usize, capacity: usize },

    #[error("failed to load shader {path:?}: {reason}")]
    ShaderLoad { path: PathBuf, reason: String },

    #[error("failed to create {what}: {result}")]
    PipelineCreation {
        what: &'static str,
        result: vk::Result,
    },

    #[error("failed to create {what}: {result}")]
    CommandAllocation {
        what: &'static str,
        result: vk::Result,
    },
}

impl ResourceError {
    pub fn pipeline(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::PipelineCreation { what, result }
    }
}
