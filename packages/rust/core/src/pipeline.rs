//! End-to-end `generate` pipeline: datasets → match → per-entity edits → export.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use merchgen_assets::{AssetRequest, AssetResolver};
use merchgen_document::{DocumentSession, NodeId};
use merchgen_export::{
    DeliveryReport, Deliverer, RemoteKey, RemoteOutcome, artifact_file_name, export_and_deliver,
};
use merchgen_sheets::SheetSource;
use merchgen_shared::{
    AppConfig, AssetConfig, BatchResult, MatchedEntity, MerchGenError, Result, RunId,
};
use merchgen_templates::{DesignContext, DesignTemplate, TemplateRegistry};

use crate::matching::{MatchOptions, match_requests};

/// Undo-history label for one run.
const EDIT_GROUP: &str = "Generate Merch Designs";

/// Configuration for one `generate` run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Identifier recorded in the result, so callers can log the run up front.
    pub run_id: RunId,
    /// League name, looked up in the master registry.
    pub league: String,
    /// Local league folder; asset paths resolve under it.
    pub base_folder: PathBuf,
    pub assets: AssetConfig,
    pub matching: MatchOptions,
    /// Name of the placed logo node.
    pub logo_layer: String,
    /// Name of the team name text node.
    pub team_name_layer: String,
    /// Pause around baseline edits for host redraw.
    pub step_delay: Duration,
    /// Use this template instead of the one in the settings dataset.
    pub template_override: Option<String>,
    /// Export every entity when set.
    pub export: Option<ExportPlan>,
}

impl BatchConfig {
    /// Defaults from the app config; the league is the base folder's name.
    pub fn from_app(config: &AppConfig, base_folder: PathBuf) -> Self {
        let league = base_folder
            .file_name()
            .map(|n| n.to_string_lossy().trim().to_string())
            .unwrap_or_default();
        Self {
            run_id: RunId::new(),
            league,
            base_folder,
            assets: AssetConfig::from(config),
            matching: MatchOptions {
                case_sensitive: config.matching.case_sensitive,
            },
            logo_layer: config.layers.logo.clone(),
            team_name_layer: config.layers.team_name.clone(),
            step_delay: Duration::from_millis(config.batch.step_delay_ms),
            template_override: None,
            export: None,
        }
    }

    /// Export into `{base folder}/{output_dir_name}`.
    pub fn with_export(mut self, config: &AppConfig, cloud_enabled: Option<bool>) -> Self {
        self.export = Some(ExportPlan {
            output_dir: self.base_folder.join(&config.export.output_dir_name),
            cloud_enabled,
        });
        self
    }
}

/// Where and how per-entity artifacts are delivered.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub output_dir: PathBuf,
    /// `None` asks the runtime toggle.
    pub cloud_enabled: Option<bool>,
}

/// One entity's export attempt.
#[derive(Debug, Clone, Serialize)]
pub struct EntityDelivery {
    pub entity: String,
    pub local_path: PathBuf,
    pub remote_key: Option<RemoteKey>,
    /// `None` when the local write failed.
    pub report: Option<DeliveryReport>,
}

impl EntityDelivery {
    /// Status label for history records.
    pub fn status(&self) -> &'static str {
        match &self.report {
            Some(report) => report.remote.status(),
            None => "export_failed",
        }
    }
}

/// Result of the `generate` pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub result: BatchResult,
    pub deliveries: Vec<EntityDelivery>,
}

/// How one entity ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOutcome {
    Processed,
    /// The document lacks a required node.
    Skipped,
    /// The template routine failed.
    Failed,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before an entity's edits begin.
    fn entity_started(&self, name: &str, current: usize, total: usize);
    /// Called when an entity is done.
    fn entity_finished(&self, name: &str, outcome: EntityOutcome);
    /// Called when the pipeline completes.
    fn done(&self, result: &BatchResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn entity_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn entity_finished(&self, _name: &str, _outcome: EntityOutcome) {}
    fn done(&self, _result: &BatchResult) {}
}

/// Collaborators of one run.
pub struct BatchDeps<'a> {
    pub sheets: &'a mut SheetSource,
    pub session: &'a DocumentSession,
    pub templates: &'a TemplateRegistry,
    pub deliverer: Option<&'a Deliverer>,
    pub progress: &'a dyn ProgressReporter,
}

/// Run the full `generate` pipeline.
///
/// 1. Check that a document is open (the only fatal failure)
/// 2. Load requests, roster and settings (failures degrade to empty)
/// 3. Match requests against the roster
/// 4. Edit, customize and optionally export each entity in one edit group
#[instrument(skip_all, fields(league = %config.league))]
pub async fn generate_designs(config: &BatchConfig, deps: BatchDeps<'_>) -> Result<BatchReport> {
    let start = Instant::now();
    let BatchDeps {
        sheets,
        session,
        templates,
        deliverer,
        progress,
    } = deps;

    if !session.is_attached().await {
        return Err(MerchGenError::precondition("no document is open"));
    }

    let mut result = BatchResult {
        run_id: config.run_id.clone(),
        ..Default::default()
    };
    info!(run_id = %result.run_id, "starting generate pipeline");

    // --- Phase 1: Datasets ---
    progress.phase("Loading team data");
    let requests = sheets.load_merch_requests(&config.league).await;
    let roster = sheets.load_roster(&config.league).await;
    let settings = sheets.load_merch_settings(&config.league).await;

    result.design_id = config
        .template_override
        .clone()
        .unwrap_or(settings.design_id);
    result.product_id = settings.product_id;

    if requests.is_empty() || roster.is_empty() {
        warn!(
            requests = requests.len(),
            roster = roster.len(),
            "no merch/team data"
        );
        result.no_data = true;
        result.elapsed_ms = start.elapsed().as_millis() as u64;
        progress.done(&result);
        return Ok(BatchReport {
            result,
            deliveries: Vec::new(),
        });
    }

    let template = if result.design_id.is_empty() {
        None
    } else {
        templates.load(&result.design_id)
    };

    // --- Phase 2: Matching ---
    progress.phase("Matching teams");
    let outcome = match_requests(&requests, &roster, config.matching);
    result.missing = outcome.missing.len();
    info!(
        matched = outcome.matched.len(),
        missing = result.missing,
        "matched requests"
    );

    // --- Phase 3: Per-entity edits ---
    progress.phase("Generating designs");
    let mut resolver = AssetResolver::new(&config.assets, &config.base_folder)?;
    let mut deliveries = Vec::new();
    let mut run = EntityRun {
        config,
        session,
        template,
        deliverer,
        resolver: &mut resolver,
        result: &mut result,
        deliveries: &mut deliveries,
    };

    session.begin_edit_group(EDIT_GROUP).await?;
    let total = outcome.matched.len();
    let mut fatal = None;
    for (i, entity) in outcome.matched.iter().enumerate() {
        progress.entity_started(entity.full_name(), i + 1, total);
        let entity_outcome = match run.process(entity).await {
            Ok(o) => o,
            Err(e) if e.is_fatal() => {
                fatal = Some(e);
                break;
            }
            Err(e) => {
                warn!(entity = %entity.full_name(), error = %e, "entity abandoned");
                EntityOutcome::Failed
            }
        };
        match entity_outcome {
            EntityOutcome::Processed => run.result.processed += 1,
            EntityOutcome::Skipped => run.result.skipped += 1,
            EntityOutcome::Failed => run.result.failed += 1,
        }
        progress.entity_finished(entity.full_name(), entity_outcome);
    }
    let closed = session.end_edit_group().await;
    resolver.close().await;

    if let Some(e) = fatal {
        return Err(e);
    }
    closed?;

    result.elapsed_ms = start.elapsed().as_millis() as u64;
    info!(
        processed = result.processed,
        missing = result.missing,
        skipped = result.skipped,
        failed = result.failed,
        exported = result.exported,
        uploaded = result.uploaded,
        elapsed_ms = result.elapsed_ms,
        "generate pipeline complete"
    );
    progress.done(&result);

    Ok(BatchReport { result, deliveries })
}

// ---------------------------------------------------------------------------
// Per-entity state machine
// ---------------------------------------------------------------------------

struct EntityRun<'a> {
    config: &'a BatchConfig,
    session: &'a DocumentSession,
    template: Option<&'a dyn DesignTemplate>,
    deliverer: Option<&'a Deliverer>,
    resolver: &'a mut AssetResolver,
    result: &'a mut BatchResult,
    deliveries: &'a mut Vec<EntityDelivery>,
}

impl EntityRun<'_> {
    async fn process(&mut self, entity: &MatchedEntity) -> Result<EntityOutcome> {
        let Some((logo, team_name)) = self.targets().await? else {
            debug!(entity = %entity.full_name(), "document lacks a required layer");
            return Ok(EntityOutcome::Skipped);
        };

        // Baseline
        self.settle().await;
        self.session
            .set_text(team_name, &entity.name().to_uppercase())
            .await?;
        self.settle().await;

        // Asset
        self.apply_logo(entity, logo).await?;

        // Template
        if let Some(template) = self.template {
            let ctx = DesignContext::new(
                entity,
                &self.config.league,
                self.config.base_folder.clone(),
                logo,
                team_name,
            );
            if let Err(e) = template.customize(self.session, &ctx).await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(
                    entity = %entity.full_name(),
                    template = template.id(),
                    error = %e,
                    "template failed; entity abandoned"
                );
                return Ok(EntityOutcome::Failed);
            }
        }

        // Export
        let config = self.config;
        if let Some(plan) = &config.export {
            self.export(entity, plan).await?;
        }

        Ok(EntityOutcome::Processed)
    }

    async fn targets(&self) -> Result<Option<(NodeId, NodeId)>> {
        let logo = self
            .session
            .find_child(None, &self.config.logo_layer)
            .await?;
        let team_name = self
            .session
            .find_child(None, &self.config.team_name_layer)
            .await?;
        Ok(logo.zip(team_name))
    }

    async fn settle(&self) {
        if !self.config.step_delay.is_zero() {
            tokio::time::sleep(self.config.step_delay).await;
        }
    }

    async fn apply_logo(&mut self, entity: &MatchedEntity, logo: NodeId) -> Result<()> {
        let request = AssetRequest::team_logo(
            &self.config.assets,
            &self.config.league,
            entity.classification(),
            entity.division(),
            entity.full_name(),
        );
        let resolved = self.resolver.resolve(&request).await;

        let path = match self.resolver.keep(&resolved.resolution).await {
            Ok(Some(path)) => path,
            Ok(None) => {
                self.result.assets_unresolved += 1;
                return Ok(());
            }
            Err(e) => {
                warn!(entity = %entity.full_name(), error = %e, "could not keep downloaded logo");
                self.result.assets_unresolved += 1;
                return Ok(());
            }
        };
        match self.session.replace_contents(logo, &path).await {
            Ok(()) => {
                debug!(
                    entity = %entity.full_name(),
                    tier = resolved.resolution.tier(),
                    attempts = resolved.attempts,
                    "logo applied"
                );
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(entity = %entity.full_name(), error = %e, "logo left unchanged");
                self.result.assets_unresolved += 1;
                Ok(())
            }
        }
    }

    async fn export(&mut self, entity: &MatchedEntity, plan: &ExportPlan) -> Result<()> {
        let ext = self.session.raster_extension().await?;
        let file_name = artifact_file_name(
            entity.full_name(),
            &self.result.design_id,
            &self.result.product_id,
            &ext,
        );
        let target = plan.output_dir.join(&file_name);
        let remote_key = (!self.result.design_id.is_empty())
            .then(|| RemoteKey::new(&self.result.design_id, &file_name));

        let report = match export_and_deliver(
            self.session,
            &target,
            remote_key.as_ref(),
            plan.cloud_enabled,
            self.deliverer,
        )
        .await
        {
            Ok(report) => {
                self.result.exported += 1;
                match report.remote {
                    RemoteOutcome::Uploaded { .. } => self.result.uploaded += 1,
                    RemoteOutcome::Failed { .. } => self.result.upload_failed += 1,
                    RemoteOutcome::Skipped { .. } => {}
                }
                Some(report)
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(entity = %entity.full_name(), error = %e, "local export failed");
                self.result.export_failed += 1;
                None
            }
        };

        self.deliveries.push(EntityDelivery {
            entity: entity.full_name().to_string(),
            local_path: target,
            remote_key,
            report,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use merchgen_document::{Document, SceneDocument};
    use merchgen_shared::{DeliveryConfig, SheetsConfig};
    use std::path::Path;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCENE: &str = r#"{
        "name": "merch-front", "width": 4500, "height": 5400,
        "layers": [
            { "name": "TEAM NAME", "kind": "text",
              "text": { "contents": "TEAM", "font_size": 100 } },
            { "name": "LOGO", "kind": "placed",
              "bounds": { "left": 0, "top": 0, "right": 500, "bottom": 500 } },
            { "name": "BOTTOM", "kind": "group", "children": [
                { "name": "BAR", "kind": "shape",
                  "bounds": { "left": 0, "top": 5000, "right": 4500, "bottom": 5400 } }
            ] }
        ]
    }"#;

    const ROSTER: &str = "\
Conf,Division,Abb,Team City,Team Name,Full Team Name,Color 1
AL,East,BOS,Red,Sox,Red Sox,#BD3039
AL,East,NYY,New York,Yankees,Yankees,#0C2340
";

    const REQUESTS: &str = "\
MERCH TEAMS,,,
#,Abb,Team City,Team Name
1,BOS,Red,Sox
2,TOR,Blue,Jays
";

    struct Fixture {
        server: MockServer,
        root: PathBuf,
        base: PathBuf,
    }

    impl Fixture {
        /// League datasets served by a mock server. The CDN path is unmounted
        /// and the league folder holds only the placeholder logo.
        async fn new(requests: &str, settings: &str) -> Self {
            let server = MockServer::start().await;
            let registry = format!(
                "LEAGUE,TEAM INFO,MERCH TEAMS,MERCH SETTINGS\nMLB,{0}/roster,{0}/requests,{0}/settings\n",
                server.uri()
            );
            for (route, body) in [
                ("/registry", registry),
                ("/roster", ROSTER.to_string()),
                ("/requests", requests.to_string()),
                ("/settings", settings.to_string()),
            ] {
                Mock::given(method("GET"))
                    .and(path(route))
                    .respond_with(ResponseTemplate::new(200).set_body_string(body))
                    .mount(&server)
                    .await;
            }
            let root = std::env::temp_dir().join(format!("merchgen-core-{}", uuid::Uuid::now_v7()));
            let base = root.join("MLB");
            std::fs::create_dir_all(base.join("LOGOS")).unwrap();
            std::fs::write(base.join("LOGOS/LeagueLogo.png"), b"png").unwrap();

            Self { server, root, base }
        }

        fn sheets(&self) -> SheetSource {
            SheetSource::new(SheetsConfig {
                master_registry_url: format!("{}/registry", self.server.uri()),
                timeout_secs: 5,
            })
            .unwrap()
        }

        fn config(&self) -> BatchConfig {
            let mut app = AppConfig::default();
            app.assets.cdn_base_url = format!("{}/cdn", self.server.uri());
            app.batch.step_delay_ms = 0;
            BatchConfig::from_app(&app, self.base.clone())
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn session() -> DocumentSession {
        DocumentSession::attached(SceneDocument::from_json(SCENE).unwrap())
    }

    async fn run(
        config: &BatchConfig,
        sheets: &mut SheetSource,
        session: &DocumentSession,
        templates: &TemplateRegistry,
        deliverer: Option<&Deliverer>,
    ) -> Result<BatchReport> {
        generate_designs(
            config,
            BatchDeps {
                sheets,
                session,
                templates,
                deliverer,
                progress: &SilentProgress,
            },
        )
        .await
    }

    struct Failing;

    #[async_trait]
    impl DesignTemplate for Failing {
        fn id(&self) -> &str {
            "26-Fail"
        }

        async fn customize(&self, _: &DocumentSession, _: &DesignContext) -> Result<()> {
            Err(MerchGenError::Template("boom".into()))
        }
    }

    #[tokio::test]
    async fn processes_matched_and_counts_unmatched() {
        let fx = Fixture::new(REQUESTS, "").await;
        let config = fx.config();
        assert_eq!(config.league, "MLB");
        let session = session();

        let report = run(
            &config,
            &mut fx.sheets(),
            &session,
            &TemplateRegistry::builtin(),
            None,
        )
        .await
        .unwrap();

        let result = &report.result;
        assert_eq!(result.run_id, config.run_id);
        assert_eq!(result.processed, 1);
        assert_eq!(result.missing, 1);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.assets_unresolved, 0);
        assert_eq!(result.status_message(), "Generated 1 designs (1 unmatched).");

        let name = session.find_child(None, "TEAM NAME").await.unwrap().unwrap();
        assert_eq!(session.text(name).await.unwrap(), "SOX");
    }

    #[tokio::test]
    async fn template_failure_abandons_only_that_entity() {
        let requests = "\
MERCH TEAMS,,,
#,Abb,Team City,Team Name
1,BOS,Red,Sox
2,NYY,New York,Yankees
";
        let fx = Fixture::new(requests, "").await;
        let mut config = fx.config();
        config.template_override = Some("26-Fail".into());
        let registry = TemplateRegistry::from_templates(vec![Box::new(Failing)]);

        let report = run(&config, &mut fx.sheets(), &session(), &registry, None)
            .await
            .unwrap();

        assert_eq!(report.result.failed, 2);
        assert_eq!(report.result.processed, 0);
        assert_eq!(report.result.design_id, "26-Fail");
    }

    #[tokio::test]
    async fn unmapped_template_is_a_no_op() {
        let settings = "a,b,c,d,e,f,g,h\nx,x,x,x,x,x,x,x\n,,,,,,27-Missing,TEE\n";
        let fx = Fixture::new(REQUESTS, settings).await;

        let report = run(
            &fx.config(),
            &mut fx.sheets(),
            &session(),
            &TemplateRegistry::builtin(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.result.design_id, "27-Missing");
        assert_eq!(report.result.product_id, "TEE");
        assert_eq!(report.result.processed, 1);
        assert_eq!(report.result.failed, 0);
    }

    #[tokio::test]
    async fn missing_layers_skip_entities() {
        let fx = Fixture::new(REQUESTS, "").await;
        let session = session();
        let logo = session.find_child(None, "LOGO").await.unwrap().unwrap();
        session.with(|d| d.rename(logo, "EMBLEM")).await.unwrap();

        let report = run(
            &fx.config(),
            &mut fx.sheets(),
            &session,
            &TemplateRegistry::builtin(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.result.processed, 0);
        assert_eq!(report.result.skipped, 1);
        assert_eq!(report.result.missing, 1);
    }

    #[tokio::test]
    async fn detached_document_aborts_before_loading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let mut sheets = SheetSource::new(SheetsConfig {
            master_registry_url: format!("{}/registry", server.uri()),
            timeout_secs: 5,
        })
        .unwrap();
        let config = BatchConfig::from_app(&AppConfig::default(), PathBuf::from("/leagues/MLB"));

        let err = run(
            &config,
            &mut sheets,
            &DocumentSession::detached(),
            &TemplateRegistry::builtin(),
            None,
        )
        .await
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn empty_requests_report_no_data() {
        let fx = Fixture::new("MERCH TEAMS\n#,Abb,Team City,Team Name\n", "").await;

        let report = run(
            &fx.config(),
            &mut fx.sheets(),
            &session(),
            &TemplateRegistry::builtin(),
            None,
        )
        .await
        .unwrap();

        assert!(report.result.no_data);
        assert_eq!(report.result.status_message(), "No merch/team data found.");
    }

    /// Image backing the LOGO layer of a saved scene.
    fn logo_source(scene: &Path) -> Option<PathBuf> {
        let doc = SceneDocument::open(scene).unwrap();
        let logo = doc.find_child(None, "LOGO").unwrap();
        doc.source(logo).unwrap()
    }

    async fn logo_after_run(session: &DocumentSession, fx: &Fixture) -> Option<PathBuf> {
        let snapshot = fx.root.join("after.scene.json");
        session.export_raster(&snapshot).await.unwrap();
        logo_source(&snapshot)
    }

    async fn run_builtin(fx: &Fixture, config: &BatchConfig, session: &DocumentSession) -> BatchReport {
        run(
            config,
            &mut fx.sheets(),
            session,
            &TemplateRegistry::builtin(),
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn downloaded_logo_survives_the_run() {
        let fx = Fixture::new(REQUESTS, "").await;
        Mock::given(method("GET"))
            .and(path_regex("^/cdn/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG".to_vec()))
            .expect(1)
            .mount(&fx.server)
            .await;

        let mut app = AppConfig::default();
        app.assets.cdn_base_url = format!("{}/cdn", fx.server.uri());
        app.batch.step_delay_ms = 0;
        let config = BatchConfig::from_app(&app, fx.base.clone()).with_export(&app, Some(false));
        let session = session();

        let report = run_builtin(&fx, &config, &session).await;
        assert_eq!(report.result.processed, 1);
        assert_eq!(report.result.assets_unresolved, 0);

        let exported = logo_source(&report.deliveries[0].local_path).unwrap();
        assert!(exported.starts_with(fx.base.join("EXPORTS/ASSETS")));
        assert_eq!(std::fs::read(&exported).unwrap(), b"\x89PNG");

        let saved = logo_after_run(&session, &fx).await.unwrap();
        assert_eq!(saved, exported);
        assert!(saved.exists());
    }

    #[tokio::test]
    async fn local_logo_is_placed_when_cdn_misses() {
        let fx = Fixture::new(REQUESTS, "").await;
        let local = fx.base.join("LOGOS/TEAMS/AL/East/Red Sox.png");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, b"png").unwrap();
        let session = session();

        let report = run_builtin(&fx, &fx.config(), &session).await;

        assert_eq!(report.result.assets_unresolved, 0);
        assert_eq!(logo_after_run(&session, &fx).await, Some(local));
    }

    #[tokio::test]
    async fn placeholder_logo_is_placed_as_last_resort() {
        let fx = Fixture::new(REQUESTS, "").await;
        let session = session();

        let report = run_builtin(&fx, &fx.config(), &session).await;

        assert_eq!(report.result.assets_unresolved, 0);
        assert_eq!(
            logo_after_run(&session, &fx).await,
            Some(fx.base.join("LOGOS/LeagueLogo.png"))
        );
    }

    #[tokio::test]
    async fn unresolved_logo_leaves_layer_untouched() {
        let fx = Fixture::new(REQUESTS, "").await;
        std::fs::remove_file(fx.base.join("LOGOS/LeagueLogo.png")).unwrap();
        let session = session();

        let report = run_builtin(&fx, &fx.config(), &session).await;

        assert_eq!(report.result.processed, 1);
        assert_eq!(report.result.assets_unresolved, 1);
        assert_eq!(logo_after_run(&session, &fx).await, None);
        assert!(!fx.base.join("EXPORTS").exists());
    }

    #[tokio::test]
    async fn case_insensitive_matching_from_config() {
        let requests = "MERCH TEAMS\n#,Abb,Team City,Team Name\n1,BOS,RED,SOX\n";
        let fx = Fixture::new(requests, "").await;
        let mut config = fx.config();

        let strict = run(
            &config,
            &mut fx.sheets(),
            &session(),
            &TemplateRegistry::builtin(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(strict.result.processed, 0);
        assert_eq!(strict.result.missing, 1);

        config.matching.case_sensitive = false;
        let loose = run(
            &config,
            &mut fx.sheets(),
            &session(),
            &TemplateRegistry::builtin(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(loose.result.processed, 1);
    }

    #[tokio::test]
    async fn exports_each_entity_and_survives_upload_failure() {
        let fx = Fixture::new(REQUESTS, "").await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&fx.server)
            .await;

        let mut app = AppConfig::default();
        app.assets.cdn_base_url = format!("{}/cdn", fx.server.uri());
        app.batch.step_delay_ms = 0;
        let mut config = BatchConfig::from_app(&app, fx.base.clone()).with_export(&app, Some(true));
        config.template_override = Some("26-DivPrev".into());

        let deliverer = Deliverer::new(DeliveryConfig {
            upload_url: Some(format!("{}/upload", fx.server.uri())),
            public_base_url: "https://pub.cdn.test".into(),
            client_id: "merchgen/test".into(),
            cloud_enabled_default: false,
            timeout_secs: 5,
        })
        .unwrap();

        let report = run(
            &config,
            &mut fx.sheets(),
            &session(),
            &TemplateRegistry::builtin(),
            Some(&deliverer),
        )
        .await
        .unwrap();

        assert_eq!(report.result.processed, 1);
        assert_eq!(report.result.exported, 1);
        assert_eq!(report.result.upload_failed, 1);
        assert_eq!(report.deliveries.len(), 1);

        let delivery = &report.deliveries[0];
        assert_eq!(delivery.status(), "failed");
        assert!(
            delivery
                .local_path
                .ends_with("EXPORTS/MERCH/Red-Sox_26-DivPrev.scene.json")
        );
        assert!(std::fs::metadata(&delivery.local_path).unwrap().len() > 0);
        assert_eq!(
            delivery.remote_key.as_ref().map(RemoteKey::as_str),
            Some("26-DivPrev/Red-Sox_26-DivPrev.scene.json")
        );
    }
}
