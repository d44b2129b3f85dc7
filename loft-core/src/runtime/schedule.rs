//! Launch-geometry computation.
//!
//! A [`KernelScheduler`] turns a task's declared iteration domain plus a
//! device's hardware limits into the global/local NDRange sizes for one
//! launch. The computation is pure: same task, same limits, same answer.

use crate::runtime::device::{DeviceLimits, MAX_DIMS};

/// Launch description declared once per task.
///
/// The domain holds the iteration-space cardinality per declared dimension;
/// the work-size fields start unset and are written exactly once per
/// scheduling decision through [`TaskMetadata::apply`].
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    dims: usize,
    domain: [u64; MAX_DIMS],
    coarsening: bool,
    global_work: Option<[u64; MAX_DIMS]>,
    local_work: Option<[u64; MAX_DIMS]>,
}

impl TaskMetadata {
    /// Declare a task over the given iteration domain, one cardinality per
    /// dimension. Zero dimensions, or more than [`MAX_DIMS`], is a caller
    /// contract violation.
    pub fn new(domain: &[u64]) -> Self {
        assert!(
            !domain.is_empty() && domain.len() <= MAX_DIMS,
            "task must declare between 1 and {} dimensions, got {}",
            MAX_DIMS,
            domain.len()
        );
        let mut padded = [1u64; MAX_DIMS];
        padded[..domain.len()].copy_from_slice(domain);
        TaskMetadata {
            dims: domain.len(),
            domain: padded,
            coarsening: false,
            global_work: None,
            local_work: None,
        }
    }

    pub fn with_coarsening(mut self) -> Self {
        self.coarsening = true;
        self
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Iteration-space cardinalities for the declared dimensions.
    pub fn domain(&self) -> &[u64] {
        &self.domain[..self.dims]
    }

    pub fn coarsening_enabled(&self) -> bool {
        self.coarsening
    }

    pub fn global_work(&self) -> Option<&[u64; MAX_DIMS]> {
        self.global_work.as_ref()
    }

    pub fn local_work(&self) -> Option<&[u64; MAX_DIMS]> {
        self.local_work.as_ref()
    }

    /// Record a scheduling decision in the task's output fields.
    pub fn apply(&mut self, sizes: WorkSizes) {
        self.global_work = Some(sizes.global);
        self.local_work = sizes.local;
    }
}

/// Result of one launch-geometry computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSizes {
    pub global: [u64; MAX_DIMS],

    /// `None` lets the device driver pick a local size.
    pub local: Option<[u64; MAX_DIMS]>,
}

/// Launch-geometry strategy for one device class.
pub trait KernelScheduler {
    fn global_work(&self, task: &TaskMetadata, limits: &DeviceLimits) -> [u64; MAX_DIMS];

    fn local_work(&self, task: &TaskMetadata, limits: &DeviceLimits) -> Option<[u64; MAX_DIMS]>;

    fn compute_work_sizes(&self, task: &TaskMetadata, limits: &DeviceLimits) -> WorkSizes {
        WorkSizes {
            global: self.global_work(task, limits),
            local: self.local_work(task, limits),
        }
    }
}

/// Default strategy: one work item per iteration-domain point, local size
/// left to the driver.
pub struct GenericScheduler;

impl KernelScheduler for GenericScheduler {
    fn global_work(&self, task: &TaskMetadata, _limits: &DeviceLimits) -> [u64; MAX_DIMS] {
        let mut global = [1u64; MAX_DIMS];
        global[..task.dims()].copy_from_slice(task.domain());
        global
    }

    fn local_work(&self, _task: &TaskMetadata, _limits: &DeviceLimits) -> Option<[u64; MAX_DIMS]> {
        None
    }
}

/// CPU strategy: parallelism is one work item per logical core, not per
/// iteration.
///
/// With thread coarsening the domain cardinality is kept for dimensions the
/// hardware can actually spread out (work-item limit above one); other
/// dimensions collapse to a single item. Without coarsening, dimension 0
/// gets the scaled compute-unit count and the rest get one item each.
pub struct CpuScheduler {
    unit_scale: f64,
}

impl CpuScheduler {
    /// `unit_scale` is the compute-unit coefficient from
    /// [`Tunables`](crate::config::Tunables), default 1.0.
    pub fn new(unit_scale: f64) -> Self {
        CpuScheduler { unit_scale }
    }
}

impl KernelScheduler for CpuScheduler {
    fn global_work(&self, task: &TaskMetadata, limits: &DeviceLimits) -> [u64; MAX_DIMS] {
        let mut global = [1u64; MAX_DIMS];
        for i in 0..task.dims() {
            global[i] = if task.coarsening_enabled() {
                if limits.max_work_item_sizes[i] > 1 { task.domain()[i] } else { 1 }
            } else if i == 0 {
                (limits.max_compute_units as f64 * self.unit_scale).round() as u64
            } else {
                1
            };
        }
        global
    }

    fn local_work(&self, _task: &TaskMetadata, _limits: &DeviceLimits) -> Option<[u64; MAX_DIMS]> {
        None
    }
}
