use std::collections::BTreeMap;

use crate::analysis::{
    AssignmentSummary, FeatureAggregator, HeuristicLearner, IngestReport, ParetoExplorer,
    PathfindingEngine, SearchQuery, SweepSpec, Tessellation, ZoneTessellator,
};
use crate::config::{AnalysisConfig, EdgeCost};
use crate::domain::{FeatureVector, GraphSpec, NodeId, SensorManifest, StreetGraph, ZoneId};
use crate::error::{StressError, StressResult};
use crate::models::{
    ModelRegistry, ParetoFront, Path, ProfileSnapshot, Registration, SearchParams, ZoneStressMap,
};

/// Owns the whole data flow for one corridor: zones, zoned graph, live
/// profiles and the model registry.
///
/// Nothing here is global. Each query freezes the deployed model and the
/// current profile snapshot into a [`ZoneStressMap`] and searches against it.
pub struct StressEngine {
    config: AnalysisConfig,
    tessellation: Tessellation,
    graph: StreetGraph,
    assignment: AssignmentSummary,
    aggregator: FeatureAggregator,
    learner: HeuristicLearner,
    registry: ModelRegistry,
}

impl StressEngine {
    /// Builds from on-disk inputs. The graph must use the manifest's coordinate system.
    pub fn from_specs(
        config: AnalysisConfig,
        manifest: &SensorManifest,
        graph: GraphSpec,
        registry: ModelRegistry,
    ) -> StressResult<Self> {
        if graph.coordinates != manifest.coordinates {
            return Err(StressError::configuration(format!(
                "street graph is {} but the sensor manifest is {}",
                graph.coordinates, manifest.coordinates
            )));
        }
        let tessellation = ZoneTessellator::new(config.tessellation.clone()).tessellate(manifest)?;
        let graph = StreetGraph::from_spec(graph, tessellation.projection())?;
        Self::assemble(config, tessellation, graph, registry)
    }

    /// Builds around an already projected graph.
    pub fn new(
        config: AnalysisConfig,
        manifest: &SensorManifest,
        graph: StreetGraph,
        registry: ModelRegistry,
    ) -> StressResult<Self> {
        let tessellation = ZoneTessellator::new(config.tessellation.clone()).tessellate(manifest)?;
        Self::assemble(config, tessellation, graph, registry)
    }

    fn assemble(
        config: AnalysisConfig,
        tessellation: Tessellation,
        mut graph: StreetGraph,
        registry: ModelRegistry,
    ) -> StressResult<Self> {
        config.validate()?;
        let assignment = tessellation.assign_nodes(&mut graph)?;
        let aggregator = FeatureAggregator::for_tessellation(config.aggregation.clone(), &tessellation)?;
        let learner = HeuristicLearner::new(config.learner.clone());
        log::info!(
            "Engine ready: {} zone(s), {} node(s), {} model version(s), deployed {:?}",
            tessellation.len(),
            graph.len(),
            registry.len(),
            registry.deployed_version()
        );
        Ok(Self {
            config,
            tessellation,
            graph,
            assignment,
            aggregator,
            learner,
            registry,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn tessellation(&self) -> &Tessellation {
        &self.tessellation
    }

    pub fn graph(&self) -> &StreetGraph {
        &self.graph
    }

    pub fn assignment(&self) -> &AssignmentSummary {
        &self.assignment
    }

    pub fn aggregator(&self) -> &FeatureAggregator {
        &self.aggregator
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> ModelRegistry {
        self.registry
    }

    pub fn ingest(&self, fv: &FeatureVector) -> StressResult<ZoneId> {
        self.aggregator.ingest(fv)
    }

    pub fn ingest_batch(&self, batch: &[FeatureVector]) -> IngestReport {
        self.aggregator.ingest_batch_parallel(batch)
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        self.aggregator.snapshot()
    }

    /// Fits and registers the next model version. Training targets are the
    /// zones' mean stress proxy unless external labels are given. The new
    /// version is not deployed; call [`promote`](Self::promote).
    pub fn train(&mut self, labels: Option<&BTreeMap<ZoneId, f64>>) -> StressResult<Registration> {
        let snapshot = self.snapshot();
        let samples = match labels {
            Some(labels) => HeuristicLearner::samples_with_labels(&snapshot, labels)?,
            None => HeuristicLearner::samples_from_snapshot(&snapshot),
        };
        let model = self.learner.fit(&samples, self.registry.next_version())?;
        let registration = self.registry.register(model)?;
        if registration.regressed {
            log::warn!(
                "Model v{} is worse on held-out data than the deployed model (baseline MAE {:?})",
                registration.version,
                registration.baseline_mae
            );
        }
        Ok(registration)
    }

    pub fn promote(&mut self, version: u32) -> StressResult<()> {
        self.registry.promote(version)?;
        log::info!("Deployed model v{}", version);
        Ok(())
    }

    pub fn rollback(&mut self) -> StressResult<u32> {
        let version = self.registry.rollback()?;
        log::info!("Rolled back to model v{}", version);
        Ok(version)
    }

    /// Deployed model applied to the current profiles.
    pub fn stress_map(&self) -> StressResult<ZoneStressMap> {
        let model = self.registry.require_deployed()?;
        ZoneStressMap::from_model(
            model,
            &self.snapshot(),
            self.tessellation.zone_ids(),
            self.config.search.fallback,
        )
    }

    /// Single route. `params` defaults to the configured W and alpha.
    ///
    /// Without a deployed model, a purely geometric query (alpha = 0) still
    /// runs on distance alone; anything that needs stress fails with
    /// `InsufficientData`.
    pub fn route(&self, start: NodeId, goal: NodeId, params: Option<SearchParams>) -> StressResult<Path> {
        let params =
            params.unwrap_or_else(|| SearchParams::new(self.config.search.weight, self.config.search.alpha));
        let query = SearchQuery::new(start, goal, params).with_budget(self.config.search.max_expansions);

        match self.stress_map() {
            Ok(map) => {
                let engine = PathfindingEngine::new(&self.graph, Some(&map), &self.config.search)?;
                engine.search(&query)
            }
            Err(err @ StressError::InsufficientData { .. }) if params.alpha.value() == 0.0 => {
                log::warn!("{}; routing on distance only", err);
                let engine = PathfindingEngine::with_policy(
                    &self.graph,
                    None,
                    EdgeCost::Distance,
                    self.config.search.heuristic,
                    self.config.search.attachment,
                )?;
                engine.search(&query)
            }
            Err(err) => Err(err),
        }
    }

    /// Pareto sweep between `start` and `goal`. Needs a deployed model.
    pub fn explore(&self, start: NodeId, goal: NodeId, sweep: &SweepSpec) -> StressResult<ParetoFront> {
        let map = self.stress_map()?;
        let engine = PathfindingEngine::new(&self.graph, Some(&map), &self.config.search)?;
        ParetoExplorer::new(&engine)
            .with_budget(self.config.search.max_expansions)
            .explore(start, goal, sweep)
    }
}
