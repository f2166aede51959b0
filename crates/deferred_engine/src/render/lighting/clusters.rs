//! Cluster grid layout and the two cluster kernels
//!
//! The view frustum is split into `gx × gy × gz` clusters: screen tiles in x
//! and y, logarithmic depth slices in z. The functions here are the CPU
//! reference of the compute shaders `cluster_bounds.comp` and
//! `cluster_light_cull.comp`; both read and write the same [`GpuCluster`]
//! layout, and the headless backend executes them for its dispatches.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::api::Extent2D;
use crate::render::lighting::point_light::PointLight;

/// Maximum number of lights one cluster can reference
pub const CLUSTER_LIGHT_CAPACITY: usize = 100;

/// Invocations per workgroup of the light cull kernel
pub const CULL_LOCAL_SIZE: u32 = 128;

/// One cluster as stored in the cluster storage buffer (std430, 448 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuCluster {
    /// View-space AABB minimum, w unused
    pub min_point: [f32; 4],
    /// View-space AABB maximum, w unused
    pub max_point: [f32; 4],
    /// Number of valid entries in `light_indices`
    pub count: u32,
    /// Indices into the visible light buffer
    pub light_indices: [u32; CLUSTER_LIGHT_CAPACITY],
    _pad: [u32; 3],
}

impl Default for GpuCluster {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl GpuCluster {
    /// AABB minimum corner
    pub fn min(&self) -> Vec3 {
        Vec3::new(self.min_point[0], self.min_point[1], self.min_point[2])
    }

    /// AABB maximum corner
    pub fn max(&self) -> Vec3 {
        Vec3::new(self.max_point[0], self.max_point[1], self.max_point[2])
    }

    /// Light indices assigned to this cluster
    pub fn lights(&self) -> &[u32] {
        let count = (self.count as usize).min(CLUSTER_LIGHT_CAPACITY);
        &self.light_indices[..count]
    }

    /// Squared distance from `center` to the closest point of the AABB
    pub fn distance_squared(&self, center: &Vec3) -> f32 {
        let closest = center.sup(&self.min()).inf(&self.max());
        (closest - center).norm_squared()
    }
}

/// Counters written by the light cull kernel (std430, 16 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct ClusterStats {
    /// Light/cluster pairs dropped because a cluster was full
    pub overflow_count: u32,
    _pad: [u32; 3],
}

/// Dimensions of the cluster grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterGrid {
    /// Clusters along screen x, screen y and depth
    pub dims: [u32; 3],
}

impl ClusterGrid {
    /// Create a grid
    pub const fn new(dims: [u32; 3]) -> Self {
        Self { dims }
    }

    /// Total number of clusters
    pub fn count(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }

    /// Linear index of cluster `(x, y, z)`: `x + y·gx + z·gx·gy`
    pub fn linear_index(&self, x: u32, y: u32, z: u32) -> usize {
        let [gx, gy, _] = self.dims;
        x as usize + y as usize * gx as usize + z as usize * gx as usize * gy as usize
    }

    /// Inverse of [`ClusterGrid::linear_index`]
    pub fn coords(&self, index: usize) -> [u32; 3] {
        let [gx, gy, _] = self.dims.map(|d| d as usize);
        [(index % gx) as u32, ((index / gx) % gy) as u32, (index / (gx * gy)) as u32]
    }

    /// Workgroups for the light cull dispatch: `ceil(count / 128)`
    pub fn cull_groups(&self) -> [u32; 3] {
        let groups = (self.count() as u32).div_ceil(CULL_LOCAL_SIZE);
        [groups, 1, 1]
    }

    /// Size in bytes of the cluster storage buffer
    pub fn buffer_size(&self) -> usize {
        self.count() * std::mem::size_of::<GpuCluster>()
    }
}

/// Camera inputs to the bounds kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Inverse of the projection matrix
    pub inverse_projection: Mat4,
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
    /// Surface size in pixels
    pub screen: Extent2D,
    /// Grid layout
    pub grid: ClusterGrid,
}

impl ClusterParams {
    /// View-space depth of slice boundary `slice`: `near · (far/near)^(slice/gz)`
    pub fn slice_depth(&self, slice: u32) -> f32 {
        let gz = self.grid.dims[2] as f32;
        self.near * (self.far / self.near).powf(slice as f32 / gz)
    }

    /// Unproject a screen position onto the near plane in view space
    pub fn screen_to_view(&self, screen: [f32; 2]) -> Vec3 {
        let ndc = Vec4::new(
            screen[0] / self.screen.width as f32 * 2.0 - 1.0,
            screen[1] / self.screen.height as f32 * 2.0 - 1.0,
            -1.0,
            1.0,
        );
        let view = self.inverse_projection * ndc;
        view.xyz() / view.w
    }

    /// View-space AABB of cluster `(x, y, z)`
    pub fn cluster_aabb(&self, x: u32, y: u32, z: u32) -> (Vec3, Vec3) {
        let [gx, gy, _] = self.grid.dims;
        let tile = [
            self.screen.width as f32 / gx as f32,
            self.screen.height as f32 / gy as f32,
        ];

        let min_tile = self.screen_to_view([x as f32 * tile[0], y as f32 * tile[1]]);
        let max_tile = self.screen_to_view([(x + 1) as f32 * tile[0], (y + 1) as f32 * tile[1]]);

        let plane_near = self.slice_depth(z);
        let plane_far = self.slice_depth(z + 1);

        let points = [
            intersect_z_plane(&min_tile, plane_near),
            intersect_z_plane(&min_tile, plane_far),
            intersect_z_plane(&max_tile, plane_near),
            intersect_z_plane(&max_tile, plane_far),
        ];

        let min = points.iter().skip(1).fold(points[0], |acc, p| acc.inf(p));
        let max = points.iter().skip(1).fold(points[0], |acc, p| acc.sup(p));
        (min, max)
    }
}

/// Point where the ray from the eye through `end` crosses `z = -depth`
fn intersect_z_plane(end: &Vec3, depth: f32) -> Vec3 {
    end * (depth / -end.z)
}

/// Write the AABB of every cluster
///
/// `clusters` must hold at least `params.grid.count()` entries. Light counts
/// and indices are left untouched.
pub fn build_cluster_bounds(params: &ClusterParams, clusters: &mut [GpuCluster]) {
    let [gx, gy, gz] = params.grid.dims;
    for z in 0..gz {
        for y in 0..gy {
            for x in 0..gx {
                let (min, max) = params.cluster_aabb(x, y, z);
                let cluster = &mut clusters[params.grid.linear_index(x, y, z)];
                cluster.min_point = [min.x, min.y, min.z, 0.0];
                cluster.max_point = [max.x, max.y, max.z, 0.0];
            }
        }
    }
}

/// Rebuild one cluster's light list; returns how many lights were dropped
///
/// A light intersects when the squared distance from its view-space centre
/// to the closest point of the AABB is at most `radius²`. Lights beyond
/// [`CLUSTER_LIGHT_CAPACITY`] are counted, not stored.
pub fn cull_cluster(cluster: &mut GpuCluster, view_lights: &[(Vec3, f32)]) -> u32 {
    cluster.count = 0;
    let mut dropped = 0;

    for (i, (center, radius)) in view_lights.iter().enumerate() {
        if cluster.distance_squared(center) > radius * radius {
            continue;
        }
        if (cluster.count as usize) < CLUSTER_LIGHT_CAPACITY {
            cluster.light_indices[cluster.count as usize] = i as u32;
            cluster.count += 1;
        } else {
            dropped += 1;
        }
    }
    dropped
}

/// View-space centre and radius of each light, in buffer order
pub fn lights_to_view(lights: &[PointLight], view: &Mat4) -> Vec<(Vec3, f32)> {
    lights
        .iter()
        .map(|light| {
            let center = view * Vec4::from(light.position);
            (center.xyz(), light.radius)
        })
        .collect()
}

/// Assign lights to every cluster; returns the total number dropped
///
/// Indices refer to positions in `lights`.
pub fn assign_lights(clusters: &mut [GpuCluster], lights: &[PointLight], view: &Mat4) -> u32 {
    let view_lights = lights_to_view(lights, view);
    clusters
        .iter_mut()
        .map(|cluster| cull_cluster(cluster, &view_lights))
        .sum()
}
