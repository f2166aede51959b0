//! Software execution of the cluster compute kernels
//!
//! Kernels are recognised by the file stem of their compute shader. Buffer
//! contents are decoded with unaligned reads, so the byte vectors backing
//! storage buffers need no particular alignment.

use std::collections::HashMap;
use std::mem::size_of;

use crate::foundation::math::Mat4;
use crate::render::api::{BackendResult, Extent2D, ProgramDesc, ShaderStage, UniformValue};
use crate::render::lighting::clusters::{
    cull_cluster, lights_to_view, ClusterGrid, ClusterParams, ClusterStats, GpuCluster, CULL_LOCAL_SIZE,
};
use crate::render::lighting::PointLight;
use crate::render::RenderError;

/// Compute kernels the headless device can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SoftwareKernel {
    /// `cluster_bounds.comp`
    ClusterBounds,
    /// `cluster_light_cull.comp`
    ClusterLightCull,
}

impl SoftwareKernel {
    /// Kernel implementing a program's compute stage, if known
    pub(crate) fn for_program(desc: &ProgramDesc) -> Option<Self> {
        let stem = desc.stage_path(ShaderStage::Compute)?.file_stem()?.to_str()?;
        match stem {
            "cluster_bounds" => Some(Self::ClusterBounds),
            "cluster_light_cull" => Some(Self::ClusterLightCull),
            _ => None,
        }
    }
}

fn missing(name: &str, kind: &str) -> RenderError {
    RenderError::BackendError(format!("uniform '{name}' is not set as {kind}"))
}

fn uniform_f32(uniforms: &HashMap<String, UniformValue>, name: &str) -> BackendResult<f32> {
    match uniforms.get(name) {
        Some(UniformValue::Float(v)) => Ok(*v),
        _ => Err(missing(name, "float")),
    }
}

fn uniform_mat4(uniforms: &HashMap<String, UniformValue>, name: &str) -> BackendResult<Mat4> {
    match uniforms.get(name) {
        Some(UniformValue::Mat4(m)) => Ok(*m),
        _ => Err(missing(name, "mat4")),
    }
}

fn uniform_uvec2(uniforms: &HashMap<String, UniformValue>, name: &str) -> BackendResult<[u32; 2]> {
    match uniforms.get(name) {
        Some(UniformValue::UVec2(v)) => Ok(*v),
        _ => Err(missing(name, "uvec2")),
    }
}

fn uniform_uvec3(uniforms: &HashMap<String, UniformValue>, name: &str) -> BackendResult<[u32; 3]> {
    match uniforms.get(name) {
        Some(UniformValue::UVec3(v)) => Ok(*v),
        _ => Err(missing(name, "uvec3")),
    }
}

fn read_cluster(bytes: &[u8], index: usize) -> GpuCluster {
    let stride = size_of::<GpuCluster>();
    bytemuck::pod_read_unaligned(&bytes[index * stride..(index + 1) * stride])
}

fn write_cluster(bytes: &mut [u8], index: usize, cluster: &GpuCluster) {
    let stride = size_of::<GpuCluster>();
    bytes[index * stride..(index + 1) * stride].copy_from_slice(bytemuck::bytes_of(cluster));
}

/// Bounds kernel: one invocation per cluster, `groups` = grid size
pub(crate) fn run_cluster_bounds(
    uniforms: &HashMap<String, UniformValue>,
    groups: [u32; 3],
    clusters: &mut [u8],
) -> BackendResult<()> {
    let [width, height] = uniform_uvec2(uniforms, "screenDimensions")?;
    let params = ClusterParams {
        inverse_projection: uniform_mat4(uniforms, "inverseProjection")?,
        near: uniform_f32(uniforms, "zNear")?,
        far: uniform_f32(uniforms, "zFar")?,
        screen: Extent2D::new(width, height),
        grid: ClusterGrid::new(uniform_uvec3(uniforms, "gridSize")?),
    };

    let capacity = clusters.len() / size_of::<GpuCluster>();
    for z in 0..groups[2] {
        for y in 0..groups[1] {
            for x in 0..groups[0] {
                let index = params.grid.linear_index(x, y, z);
                if index >= capacity {
                    return Err(RenderError::BackendError(format!(
                        "cluster {index} is outside a buffer of {capacity} clusters"
                    )));
                }
                let (min, max) = params.cluster_aabb(x, y, z);
                let mut cluster = read_cluster(clusters, index);
                cluster.min_point = [min.x, min.y, min.z, 0.0];
                cluster.max_point = [max.x, max.y, max.z, 0.0];
                write_cluster(clusters, index, &cluster);
            }
        }
    }
    Ok(())
}

/// Light cull kernel: one invocation per cluster, 128 per workgroup
///
/// Invocations past the end of the cluster buffer do nothing. Dropped
/// lights are added to the stats buffer's overflow counter.
pub(crate) fn run_light_cull(
    uniforms: &HashMap<String, UniformValue>,
    groups: [u32; 3],
    clusters: &mut [u8],
    lights: &[u8],
    stats: &mut [u8],
) -> BackendResult<()> {
    let view = uniform_mat4(uniforms, "viewMatrix")?;

    let lights: Vec<PointLight> = lights
        .chunks_exact(size_of::<PointLight>())
        .map(bytemuck::pod_read_unaligned::<PointLight>)
        .collect();
    let view_lights = lights_to_view(&lights, &view);

    let cluster_count = clusters.len() / size_of::<GpuCluster>();
    let invocations = groups.iter().map(|&g| g as usize).product::<usize>() * CULL_LOCAL_SIZE as usize;

    let mut dropped = 0;
    for index in 0..invocations.min(cluster_count) {
        let mut cluster = read_cluster(clusters, index);
        dropped += cull_cluster(&mut cluster, &view_lights);
        write_cluster(clusters, index, &cluster);
    }

    let stats_size = size_of::<ClusterStats>();
    if stats.len() < stats_size {
        return Err(RenderError::BackendError(format!(
            "cluster stats buffer holds {} bytes, needs {stats_size}",
            stats.len()
        )));
    }
    let mut counters: ClusterStats = bytemuck::pod_read_unaligned(&stats[..stats_size]);
    counters.overflow_count += dropped;
    stats[..stats_size].copy_from_slice(bytemuck::bytes_of(&counters));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{ShaderSource, StorageUsage};
    use std::path::PathBuf;

    #[test]
    fn test_kernels_are_recognised_by_file_stem() {
        let desc = |file: &str| ProgramDesc {
            label: file.to_string(),
            stages: vec![ShaderSource { stage: ShaderStage::Compute, path: PathBuf::from("shaders").join(file) }],
            storage: Vec::<StorageUsage>::new(),
        };
        assert_eq!(SoftwareKernel::for_program(&desc("cluster_bounds.comp")), Some(SoftwareKernel::ClusterBounds));
        assert_eq!(
            SoftwareKernel::for_program(&desc("cluster_light_cull.comp")),
            Some(SoftwareKernel::ClusterLightCull)
        );
        assert_eq!(SoftwareKernel::for_program(&desc("blur.comp")), None);
    }

    #[test]
    fn test_missing_uniform_is_an_error() {
        let mut clusters = vec![0u8; size_of::<GpuCluster>()];
        let result = run_cluster_bounds(&HashMap::new(), [1, 1, 1], &mut clusters);
        assert!(matches!(result, Err(RenderError::BackendError(_))));
    }
}
