//! Point lights, frustum culling and light clustering
//!
//! Per frame the [`LightCuller`] reduces the scene's [`LightSet`] to the
//! lights whose bounding spheres touch the view frustum and uploads them;
//! the [`LightClusterer`] then builds (or reuses) the cluster bounding boxes
//! and assigns the uploaded lights to clusters on the GPU.

pub mod clusterer;
pub mod clusters;
pub mod culler;
pub mod frustum;
pub mod point_light;

pub use clusterer::{ClusterBuffers, ClusterUpdate, LightClusterer};
pub use clusters::{
    assign_lights, build_cluster_bounds, ClusterGrid, ClusterParams, ClusterStats, GpuCluster,
    CLUSTER_LIGHT_CAPACITY, CULL_LOCAL_SIZE,
};
pub use culler::{compute_visible_lights, CullResult, LightCuller};
pub use frustum::{Frustum, Plane, PlaneSide};
pub use point_light::{LightSet, PointLight};

/// Storage binding of the cluster grid buffer
pub const CLUSTER_BINDING: u32 = 1;
/// Storage binding of the visible light buffer
pub const LIGHT_BINDING: u32 = 2;
/// Storage binding of the cluster stats buffer
pub const CLUSTER_STATS_BINDING: u32 = 3;
