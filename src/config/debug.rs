//! Debugging feature flags.

pub struct LogFlags {
    /// Activate trace_time macro (for cool scope-level timing)
    pub log_performance: bool,

    pub log_tessellation: bool,

    /// Per-record rejections and per-batch ingest summaries
    pub log_aggregation: bool,

    /// λ grid, CV errors and augmentation
    pub log_learner: bool,

    pub log_pathfinder: bool,
    pub log_pareto: bool,

    pub log_registry: bool,
}

pub const DF: LogFlags = LogFlags {
    log_performance: false,

    log_tessellation: true,
    log_aggregation: false,
    log_learner: true,

    log_pathfinder: false,
    log_pareto: false,

    log_registry: true,
};
