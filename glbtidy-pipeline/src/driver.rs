//! Stage sequencing for one object and scene-level fan-out

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::report::{ObjectOutcome, ObjectReport, PipelineState, RunReport, StageTiming};
use glbtidy_cleanup::{deduplicate_vertices, fill_holes, recompute_normals, remove_loose_geometry};
use glbtidy_core::{Error, Result, Stage, StageWarning, TriangleMesh};
use glbtidy_io::{export_glb, import_glb, MeshObject, Scene};
use glbtidy_simplification::{non_manifold_edge_count, MeshSimplifier};
use glbtidy_uv::unwrap_uvs;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// Result of running every stage on one mesh
#[derive(Debug)]
pub struct MeshRun {
    pub mesh: TriangleMesh,
    pub warnings: Vec<StageWarning>,
    pub timings: Vec<StageTiming>,
}

/// Progress of a single object; kept apart from the mesh so a failure can still report
/// how far the object got
#[derive(Debug)]
struct Progress {
    state: PipelineState,
    warnings: Vec<StageWarning>,
    timings: Vec<StageTiming>,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: PipelineState::Imported,
            warnings: Vec::new(),
            timings: Vec::new(),
        }
    }
}

/// Runs the cleanup, decimation and UV stages over meshes and scenes
pub struct MeshPipeline {
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl MeshPipeline {
    /// Create a pipeline; the configuration is validated up front
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A handle that cancels this pipeline's runs at the next state transition
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run all six stages on one mesh
    pub fn run_mesh(&self, mesh: TriangleMesh) -> Result<MeshRun> {
        let mut mesh = mesh;
        let mut progress = Progress::new();
        self.run_stages(&mut mesh, &mut progress)?;
        Ok(MeshRun {
            mesh,
            warnings: progress.warnings,
            timings: progress.timings,
        })
    }

    /// Run one scene object
    ///
    /// Never fails as a whole: on a fatal error the original object is returned
    /// unmodified and the error is recorded in the report.
    pub fn run_object(&self, object: MeshObject) -> (MeshObject, ObjectReport) {
        let _span = info_span!("object", name = %object.name).entered();
        let faces_before = object.mesh.face_count();
        let vertices_before = object.mesh.vertex_count();
        let mut progress = Progress::new();
        let mut mesh = object.mesh.clone();

        match self.run_stages(&mut mesh, &mut progress) {
            Ok(()) => {
                let report = ObjectReport {
                    name: object.name.clone(),
                    state: progress.state,
                    outcome: if progress.warnings.is_empty() {
                        ObjectOutcome::Succeeded
                    } else {
                        ObjectOutcome::SucceededWithWarnings(progress.warnings)
                    },
                    timings: progress.timings,
                    faces_before,
                    faces_after: mesh.face_count(),
                    vertices_before,
                    vertices_after: mesh.vertex_count(),
                };
                (MeshObject { mesh, ..object }, report)
            }
            Err(err) => {
                warn!(state = %progress.state, error = %err, "Object failed; passing it through unmodified");
                let report = ObjectReport {
                    name: object.name.clone(),
                    state: progress.state,
                    outcome: ObjectOutcome::Failed(err),
                    timings: progress.timings,
                    faces_before,
                    faces_after: faces_before,
                    vertices_before,
                    vertices_after: vertices_before,
                };
                (object, report)
            }
        }
    }

    /// Run every object of the scene, concurrently when configured
    ///
    /// Objects keep their order. Objects that finish all stages are marked exported;
    /// failed objects come back unmodified. A cancellation that arrives after an object
    /// finished its stages marks it failed but keeps its processed mesh.
    pub fn process_scene(&self, scene: Scene) -> Result<(Scene, RunReport)> {
        let start = Instant::now();
        let count = scene.len();
        info!(objects = count, faces = scene.total_faces(), parallel = self.config.parallel, "Processing scene");

        let results: Vec<(MeshObject, ObjectReport)> = if self.config.parallel && count > 1 {
            let pool = self.thread_pool()?;
            pool.install(|| {
                scene
                    .objects
                    .into_par_iter()
                    .map(|object| self.run_object(object))
                    .collect()
            })
        } else {
            scene
                .objects
                .into_iter()
                .map(|object| self.run_object(object))
                .collect()
        };

        let mut out = Scene::new();
        let mut report = RunReport::default();
        for (object, mut object_report) in results {
            if object_report.outcome.is_success() {
                match self.cancel.check(PipelineState::Exported) {
                    Ok(()) => object_report.state = PipelineState::Exported,
                    Err(err) => {
                        object_report.outcome = ObjectOutcome::Failed(err);
                    }
                }
            }
            out.push(object);
            report.objects.push(object_report);
        }
        report.elapsed = start.elapsed();

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            warnings = report.warning_count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Scene processed"
        );
        Ok((out, report))
    }

    /// Decode a GLB, process it and encode the result
    pub fn process_glb(&self, bytes: &[u8]) -> Result<(Vec<u8>, RunReport)> {
        let scene = import_glb(bytes)?;
        let (scene, report) = self.process_scene(scene)?;
        let encoded = export_glb(&scene)?;
        Ok((encoded, report))
    }

    fn thread_pool(&self) -> Result<ThreadPool> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|index| format!("glbtidy-worker-{index}"));
        if let Some(num_threads) = self.config.num_threads {
            builder = builder.num_threads(num_threads);
        }
        builder
            .build()
            .map_err(|e| Error::Algorithm(format!("Failed to create thread pool: {e}")))
    }

    fn check_input(&self, mesh: &TriangleMesh) -> Result<()> {
        if mesh.vertices.is_empty() {
            return Err(Error::InvalidInput("mesh has no vertices".to_string()));
        }
        if mesh.faces.is_empty() {
            return Err(Error::InvalidInput("mesh has no faces".to_string()));
        }
        mesh.validate()?;
        if mesh.face_count() > self.config.max_faces {
            return Err(Error::exhausted(
                Stage::Import,
                format!(
                    "{} faces exceed the limit of {}",
                    mesh.face_count(),
                    self.config.max_faces
                ),
            ));
        }
        Ok(())
    }

    fn run_stages(&self, mesh: &mut TriangleMesh, progress: &mut Progress) -> Result<()> {
        self.check_input(mesh)?;

        for stage in Stage::PROCESSING {
            let next = PipelineState::after(stage);
            self.cancel.check(next)?;

            let started = Instant::now();
            let non_manifold_before = match stage {
                Stage::Decimation if self.config.validate_stages => non_manifold_edge_count(&mesh.faces),
                _ => 0,
            };
            let warnings = self.run_stage(stage, mesh)?;
            let duration = started.elapsed();

            if self.config.validate_stages {
                check_invariants(stage, mesh, non_manifold_before)?;
            }
            debug!(%stage, faces = mesh.face_count(), vertices = mesh.vertex_count(), ?duration, "Stage complete");

            progress.warnings.extend(warnings);
            progress.timings.push(StageTiming { stage, duration });
            progress.state = next;
        }
        Ok(())
    }

    fn run_stage(&self, stage: Stage, mesh: &mut TriangleMesh) -> Result<Vec<StageWarning>> {
        let config = &self.config;
        let warnings = match stage {
            Stage::Dedup => deduplicate_vertices(mesh, &config.dedup_params())?.warnings,
            Stage::LooseGeometry => {
                let report = remove_loose_geometry(mesh, &config.loose_params());
                if mesh.faces.is_empty() && report.removed_faces > 0 {
                    vec![logged(StageWarning::new(
                        stage,
                        format!("all {} faces were loose geometry", report.removed_faces),
                    ))]
                } else {
                    Vec::new()
                }
            }
            Stage::HoleFill => fill_holes(mesh, &config.hole_fill_params()).warnings,
            Stage::Normals => {
                let report = recompute_normals(mesh);
                if report.conflicts > 0 {
                    vec![logged(StageWarning::new(
                        stage,
                        format!(
                            "{} faces could not be oriented consistently (non-orientable surface)",
                            report.conflicts
                        ),
                    ))]
                } else {
                    Vec::new()
                }
            }
            Stage::Decimation => {
                let input = std::mem::take(mesh);
                let result = config.simplifier().decimate(input, config.target_faces)?;
                let warning = result.warning().map(logged);
                *mesh = result.mesh;
                warning.into_iter().collect()
            }
            Stage::Uv => unwrap_uvs(mesh, &config.uv_params())?.warnings,
            Stage::Import | Stage::Export => Vec::new(),
        };
        for warning in &warnings {
            debug!(%warning, "Stage warning recorded");
        }
        Ok(warnings)
    }
}

fn logged(warning: StageWarning) -> StageWarning {
    warn!("{warning}");
    warning
}

/// Post-stage consistency checks
fn check_invariants(stage: Stage, mesh: &TriangleMesh, non_manifold_before: usize) -> Result<()> {
    mesh.validate().map_err(|e| match e {
        Error::InvalidInput(message) => Error::invariant(stage, message),
        other => other,
    })?;
    if stage == Stage::Decimation {
        let after = non_manifold_edge_count(&mesh.faces);
        if after > non_manifold_before {
            return Err(Error::invariant(
                stage,
                format!("non-manifold edges rose from {non_manifold_before} to {after}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbtidy_core::Point3f;
    use std::time::Duration;

    fn tetrahedron() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    #[test]
    fn test_empty_mesh_is_input_error() {
        let pipeline = MeshPipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.run_mesh(TriangleMesh::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_dangling_index_is_input_error() {
        let pipeline = MeshPipeline::new(PipelineConfig::default()).unwrap();
        let mut mesh = tetrahedron();
        mesh.faces.push([0, 1, 9]);
        assert!(matches!(pipeline.run_mesh(mesh), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_face_limit_is_resource_error() {
        let pipeline = MeshPipeline::new(PipelineConfig::default().with_max_faces(3)).unwrap();
        let err = pipeline.run_mesh(tetrahedron()).unwrap_err();
        assert!(matches!(err, Error::ResourceExhaustion { stage: Stage::Import, .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(MeshPipeline::new(PipelineConfig::default().with_target_faces(0)).is_err());
    }

    #[test]
    fn test_all_stages_timed() {
        let pipeline = MeshPipeline::new(PipelineConfig::default()).unwrap();
        let run = pipeline.run_mesh(tetrahedron()).unwrap();
        let stages: Vec<Stage> = run.timings.iter().map(|t| t.stage).collect();
        assert_eq!(stages, Stage::PROCESSING.to_vec());
        assert!(run.mesh.uvs.is_some());
        assert!(run.mesh.normals.is_some());
    }

    #[test]
    fn test_cancelled_before_first_stage() {
        let pipeline = MeshPipeline::new(PipelineConfig::default()).unwrap();
        pipeline.cancellation_token().cancel();
        let err = pipeline.run_mesh(tetrahedron()).unwrap_err();
        assert!(matches!(err, Error::Cancelled(ref s) if s == "deduped"));
    }

    #[test]
    fn test_failed_object_passes_through() {
        let pipeline = MeshPipeline::new(PipelineConfig::default()).unwrap();
        let object = MeshObject::new("broken", TriangleMesh::new());
        let (out, report) = pipeline.run_object(object.clone());
        assert_eq!(out, object);
        assert_eq!(report.state, PipelineState::Imported);
        assert!(report.outcome.error().is_some());
    }

    #[test]
    fn test_durations_are_nonnegative() {
        let pipeline = MeshPipeline::new(PipelineConfig::default()).unwrap();
        let (_, report) = pipeline.run_object(MeshObject::new("tet", tetrahedron()));
        assert!(report.total_time() >= Duration::ZERO);
        assert_eq!(report.timings.len(), 6);
    }
}
