//! Translation pipeline orchestration.
//!
//! A translation runs as a sequence of externally driven steps over a
//! serializable [`PipelineState`]:
//!
//! `Scanning → Analyzing → BatchProcessing (× total_batches) → Finalizing → Done`
//!
//! Each call to [`Orchestrator::step`] performs exactly one transition, so a
//! caller with a short execution budget can persist the state between steps.
//! [`Orchestrator::run_to_completion`] drives all steps in-process.

use std::sync::Arc;

use lingoflow_blocks::{
    ContentNode, count_translatable, extract_texts, plain_text, reconstruct_with_report,
};
use lingoflow_llm::{CompletionClient, CompletionRequest, parse_seo_meta, seo_meta_prompt};
use lingoflow_shared::{AppConfig, LanguageCode, LingoflowError, Result};
use lingoflow_store::{DocumentStore, append_all, create_with_children, fetch_tree};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::links::{CacheState, LinkCache};
use crate::properties::{SourceSnapshot, destination_properties, seo_properties};
use crate::scan::{TranslationTask, scan_for_missing_translations};
use crate::translator::Translator;

/// Characters of written content shown to the SEO step.
const PREVIEW_CHARS: usize = 1500;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No task selected yet; the next step scans for one.
    Scanning,
    Analyzing,
    BatchProcessing,
    Finalizing,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scanning => "scanning",
            Self::Analyzing => "analyzing",
            Self::BatchProcessing => "batch_processing",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to resume a translation in a later invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Empty while `Scanning`.
    pub source_document_id: String,
    pub target_language: LanguageCode,
    pub blog_theme: String,
    pub stage: Stage,
    /// Next slice to process.
    pub batch_index: usize,
    pub total_batches: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_properties: Option<SourceSnapshot>,
    #[serde(default)]
    pub original_tag_slugs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_title: Option<String>,
}

impl PipelineState {
    /// A state for a known source document, ready for analysis.
    pub fn new(
        source_document_id: impl Into<String>,
        target_language: LanguageCode,
        blog_theme: impl Into<String>,
    ) -> Self {
        Self {
            source_document_id: source_document_id.into(),
            target_language,
            blog_theme: blog_theme.into(),
            stage: Stage::Analyzing,
            batch_index: 0,
            total_batches: 0,
            destination_document_id: None,
            source_properties: None,
            original_tag_slugs: Vec::new(),
            translated_title: None,
        }
    }

    /// A state whose first step picks the newest task from a scan.
    pub fn scanning() -> Self {
        Self {
            stage: Stage::Scanning,
            ..Self::new(String::new(), LanguageCode::new(""), String::new())
        }
    }

    /// A state translating `task` into `language`.
    pub fn for_task(task: &TranslationTask, language: LanguageCode) -> Self {
        Self::new(task.source_document_id.clone(), language, task.category.clone())
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    fn snapshot(&self) -> Result<&SourceSnapshot> {
        self.source_properties.as_ref().ok_or_else(|| {
            LingoflowError::validation(format!("stage {} requires source properties", self.stage))
        })
    }

    fn destination(&self) -> Result<&str> {
        self.destination_document_id.as_deref().ok_or_else(|| {
            LingoflowError::validation(format!(
                "stage {} requires a destination document",
                self.stage
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Progress & reports
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called after a slice has been written.
    fn batch_done(&self, current: usize, total: usize);
    /// Called when a task starts in [`Orchestrator::run_tasks`].
    fn task_started(&self, title: &str, language: &LanguageCode);
    /// Called when [`Orchestrator::run_tasks`] completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_done(&self, _current: usize, _total: usize) {}
    fn task_started(&self, _title: &str, _language: &LanguageCode) {}
    fn done(&self, _report: &RunReport) {}
}

/// A task that failed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub task: String,
    pub language: LanguageCode,
    pub message: String,
}

/// Outcome of [`Orchestrator::run_tasks`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub processed: usize,
    pub succeeded: usize,
    pub errors: Vec<TaskFailure>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives translations through their stages.
pub struct Orchestrator {
    store: Arc<dyn DocumentStore>,
    completion: Arc<dyn CompletionClient>,
    translator: Translator,
    links: LinkCache,
    config: AppConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        completion: Arc<dyn CompletionClient>,
        config: AppConfig,
    ) -> Result<Self> {
        config.validate()?;
        let translator = Translator::new(
            Arc::clone(&completion),
            config.openai.translate_model.clone(),
            config.translation.batch_size,
        );
        let links = LinkCache::new(&config.links.site_domain)?;

        Ok(Self {
            store,
            completion,
            translator,
            links,
            config,
            progress: Arc::new(SilentProgress),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Scan for documents missing translations, newest first.
    pub async fn scan(&self) -> Result<Vec<TranslationTask>> {
        scan_for_missing_translations(self.store.as_ref(), &self.config).await
    }

    /// Perform exactly one stage transition.
    ///
    /// Stepping a `Done` state is a validation error.
    #[instrument(skip_all, fields(stage = %state.stage, source = %state.source_document_id))]
    pub async fn step(&mut self, state: PipelineState) -> Result<PipelineState> {
        let mut tree = None;
        self.advance(state, &mut tree).await
    }

    /// Step until `Done`, fetching the source tree once.
    #[instrument(skip_all, fields(source = %state.source_document_id, target = %state.target_language))]
    pub async fn run_to_completion(&mut self, mut state: PipelineState) -> Result<PipelineState> {
        let mut tree = None;
        while !state.is_done() {
            state = self.advance(state, &mut tree).await?;
        }
        Ok(state)
    }

    /// Translate up to `limit` tasks, each into its first missing language.
    ///
    /// A failing task is recorded and the run moves on to the next one.
    pub async fn run_tasks(&mut self, tasks: &[TranslationTask], limit: usize) -> RunReport {
        let mut report = RunReport::default();

        for task in tasks.iter().take(limit) {
            let Some(language) = task.missing_languages.first().cloned() else {
                continue;
            };
            self.progress.task_started(&task.title, &language);
            report.processed += 1;

            match self
                .run_to_completion(PipelineState::for_task(task, language.clone()))
                .await
            {
                Ok(done) => {
                    info!(
                        title = %task.title,
                        language = %language,
                        destination = ?done.destination_document_id,
                        "translation complete"
                    );
                    report.succeeded += 1;
                }
                Err(e) => {
                    error!(title = %task.title, language = %language, error = %e, "translation failed");
                    report.errors.push(TaskFailure {
                        task: task.title.clone(),
                        language,
                        message: e.to_string(),
                    });
                }
            }
        }

        self.progress.done(&report);
        report
    }

    async fn advance(
        &mut self,
        state: PipelineState,
        tree: &mut Option<Vec<ContentNode>>,
    ) -> Result<PipelineState> {
        self.progress.phase(state.stage.as_str());
        match state.stage {
            Stage::Scanning => self.select_task(state).await,
            Stage::Analyzing => self.analyze(state, tree).await,
            Stage::BatchProcessing => self.process_batch(state, tree).await,
            Stage::Finalizing => self.finalize(state).await,
            Stage::Done => Err(LingoflowError::validation(
                "pipeline is already done; nothing to step",
            )),
        }
    }

    // --- Scanning ---

    async fn select_task(&self, mut state: PipelineState) -> Result<PipelineState> {
        let tasks = self.scan().await?;
        let Some((task, language)) = tasks
            .iter()
            .find_map(|t| t.missing_languages.first().map(|lang| (t, lang.clone())))
        else {
            info!("no missing translations found");
            state.stage = Stage::Done;
            return Ok(state);
        };

        info!(title = %task.title, language = %language, "selected task");
        state = PipelineState::for_task(task, language);
        Ok(state)
    }

    // --- Analyzing ---

    async fn analyze(
        &self,
        mut state: PipelineState,
        tree: &mut Option<Vec<ContentNode>>,
    ) -> Result<PipelineState> {
        require_source(&state)?;
        self.config.category(&state.blog_theme)?;

        let props = self.store.get_properties(&state.source_document_id).await?;
        let snapshot = SourceSnapshot::from_properties(&props)?;
        let nodes = fetch_tree(self.store.as_ref(), &state.source_document_id).await?;

        let per_step = self.config.translation.nodes_per_invocation;
        state.total_batches = nodes.len().div_ceil(per_step).max(1);
        state.batch_index = 0;
        state.original_tag_slugs = snapshot.tag_slugs.clone();
        state.source_properties = Some(snapshot);
        state.stage = Stage::BatchProcessing;

        info!(
            top_level = nodes.len(),
            segments = count_translatable(&nodes),
            total_batches = state.total_batches,
            "source analyzed"
        );
        *tree = Some(nodes);
        Ok(state)
    }

    // --- BatchProcessing ---

    async fn process_batch(
        &mut self,
        mut state: PipelineState,
        tree: &mut Option<Vec<ContentNode>>,
    ) -> Result<PipelineState> {
        require_source(&state)?;
        let snapshot = state.snapshot()?.clone();
        let category = self.config.category(&state.blog_theme)?.clone();
        let target = state.target_language.clone();
        let first = state.batch_index == 0;
        if !first {
            state.destination()?;
        }

        if tree.is_none() {
            *tree = Some(fetch_tree(self.store.as_ref(), &state.source_document_id).await?);
        }
        let nodes = tree.as_deref().unwrap_or_default();

        let per_step = self.config.translation.nodes_per_invocation;
        let start = (state.batch_index * per_step).min(nodes.len());
        let end = (start + per_step).min(nodes.len());
        let slice = self.localize_links(&nodes[start..end], &target).await?;

        let mut texts = extract_texts(&slice);
        let with_title = first && !snapshot.title.trim().is_empty();
        if with_title {
            texts.insert(0, snapshot.title.clone());
        }

        let mut translated = self.translator.translate_texts(&texts, &target).await;
        let title = if with_title {
            translated.remove(0)
        } else {
            snapshot.title.clone()
        };

        let (content, report) = reconstruct_with_report(&slice, &translated);
        if !report.is_aligned() {
            warn!(?report, batch = state.batch_index, "slice reconstructed with misaligned text");
        }

        if first {
            let props = destination_properties(&snapshot, &title, &target, &category);
            let id = create_with_children(
                self.store.as_ref(),
                &category.collection_id,
                &props,
                &content,
            )
            .await?;
            info!(destination = %id, "destination document created");
            state.destination_document_id = Some(id);
            state.translated_title = Some(title);
        } else {
            append_all(self.store.as_ref(), state.destination()?, &content).await?;
        }

        state.batch_index += 1;
        self.progress.batch_done(state.batch_index, state.total_batches);
        info!(
            batch = state.batch_index,
            total = state.total_batches,
            nodes = content.len(),
            "slice written"
        );
        if state.batch_index >= state.total_batches {
            state.stage = Stage::Finalizing;
        }
        Ok(state)
    }

    async fn localize_links(
        &mut self,
        slice: &[ContentNode],
        target: &LanguageCode,
    ) -> Result<Vec<ContentNode>> {
        if !self.config.links.localize {
            return Ok(slice.to_vec());
        }
        if self.links.state() != CacheState::Ready {
            self.links
                .warm(self.store.as_ref(), &self.config.categories)
                .await?;
        }
        self.links.localize(slice, target)
    }

    // --- Finalizing ---

    async fn finalize(&self, mut state: PipelineState) -> Result<PipelineState> {
        let destination = state.destination()?.to_string();
        let title = match &state.translated_title {
            Some(title) => title.clone(),
            None => state.snapshot()?.title.clone(),
        };

        let first_page = self.store.list_children(&destination, None).await?;
        let written: Vec<ContentNode> = first_page.items.into_iter().map(|b| b.node).collect();
        let preview = plain_text(&written, PREVIEW_CHARS);

        let prompt = seo_meta_prompt(
            &state.target_language,
            &title,
            &preview,
            &state.original_tag_slugs,
        );
        let answer = self
            .completion
            .complete(CompletionRequest::json(
                self.config.openai.seo_model.clone(),
                prompt,
            ))
            .await?;
        let meta = parse_seo_meta(&answer)?;

        self.store
            .update_properties(
                &destination,
                &seo_properties(&meta, &state.original_tag_slugs),
            )
            .await?;
        info!(destination = %destination, "translation finalized");

        state.stage = Stage::Done;
        Ok(state)
    }
}

fn require_source(state: &PipelineState) -> Result<()> {
    if state.source_document_id.trim().is_empty() {
        return Err(LingoflowError::validation(format!(
            "stage {} requires a source document id",
            state.stage
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::names;
    use crate::testing::{ScriptedCompletion, input_segments};
    use lingoflow_blocks::{NodeKind, TextBlock, TextSpan};
    use lingoflow_shared::CategoryConfig;
    use lingoflow_store::{DocumentStore, InMemoryStore, Properties, PropertyValue, text_of};

    fn config(nodes_per_invocation: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.translation.nodes_per_invocation = nodes_per_invocation;
        config.translation.batch_size = 4;
        config.categories = vec![CategoryConfig {
            name: "FIRE".into(),
            collection_id: "db-fire".into(),
            section: None,
        }];
        config
    }

    fn source_props(title: &str, source_key: &str) -> Properties {
        let mut p = Properties::new();
        p.insert(names::TITLE.into(), PropertyValue::title(title));
        p.insert(names::SOURCE_ID.into(), PropertyValue::text(source_key));
        p.insert(names::SLUG.into(), PropertyValue::text(format!("{source_key}-slug")));
        p.insert(names::LANG.into(), PropertyValue::select("zh-hans"));
        p.insert(names::TAG_SLUG.into(), PropertyValue::multi_select(["touzi"]));
        p.insert(names::PUBLISHED.into(), PropertyValue::Checkbox(true));
        p
    }

    fn body(n: usize) -> Vec<ContentNode> {
        (0..n)
            .map(|i| {
                ContentNode::paragraph(format!("段落{i}"))
                    .with_children(vec![ContentNode::paragraph(format!("子{i}"))])
            })
            .collect()
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        completion: Arc<ScriptedCompletion>,
        orchestrator: Orchestrator,
        source: String,
    }

    fn fixture(nodes: Vec<ContentNode>, nodes_per_invocation: usize) -> Fixture {
        let store = Arc::new(InMemoryStore::with_page_size(3));
        let source = store.seed_document("db-fire", source_props("标题", "src-1"), nodes);
        let completion = Arc::new(ScriptedCompletion::prefixing());
        let orchestrator = Orchestrator::new(
            store.clone(),
            completion.clone(),
            config(nodes_per_invocation),
        )
        .unwrap();
        Fixture {
            store,
            completion,
            orchestrator,
            source,
        }
    }

    #[tokio::test]
    async fn steps_through_every_stage() {
        let mut f = fixture(body(5), 2);
        let state = PipelineState::new(&f.source, LanguageCode::new("en"), "FIRE");

        let state = f.orchestrator.step(state).await.unwrap();
        assert_eq!(state.stage, Stage::BatchProcessing);
        assert_eq!(state.total_batches, 3);
        assert_eq!(state.original_tag_slugs, ["touzi"]);

        let state = f.orchestrator.step(state).await.unwrap();
        assert_eq!(state.batch_index, 1);
        assert_eq!(state.translated_title.as_deref(), Some("EN:标题"));
        let destination = state.destination_document_id.clone().unwrap();

        // Persisting between invocations must not lose anything.
        let json = serde_json::to_string(&state).unwrap();
        let state: PipelineState = serde_json::from_str(&json).unwrap();

        let state = f.orchestrator.step(state).await.unwrap();
        let state = f.orchestrator.step(state).await.unwrap();
        assert_eq!(state.stage, Stage::Finalizing);

        let state = f.orchestrator.step(state).await.unwrap();
        assert!(state.is_done());

        let written = f.store.document_tree(&destination);
        let expected: Vec<String> = extract_texts(&body(5))
            .into_iter()
            .map(|s| format!("EN:{s}"))
            .collect();
        assert_eq!(extract_texts(&written), expected);
        assert_eq!(f.store.write_sizes(&destination), [2, 2, 1]);

        let props = f.store.properties_of(&destination).unwrap();
        assert_eq!(text_of(&props, names::TITLE).as_deref(), Some("EN:标题"));
        assert_eq!(text_of(&props, names::LANG).as_deref(), Some("en"));
        assert_eq!(text_of(&props, names::META_TITLE).as_deref(), Some("Meta"));
        assert_eq!(text_of(&props, names::KEYWORDS).as_deref(), Some("k1, k2"));
        assert_eq!(props[names::PUBLISHED], PropertyValue::Checkbox(false));
        assert_eq!(props[names::TAG].names(), ["Investing"]);

        let err = f.orchestrator.step(state).await.unwrap_err();
        assert!(matches!(err, LingoflowError::Validation { .. }));
    }

    #[tokio::test]
    async fn run_to_completion_writes_every_slice() {
        let mut f = fixture(body(7), 3);
        let state = PipelineState::new(&f.source, LanguageCode::new("zh-hant"), "fire");
        let done = f.orchestrator.run_to_completion(state).await.unwrap();

        assert!(done.is_done());
        assert_eq!(done.total_batches, 3);
        let destination = done.destination_document_id.unwrap();
        assert_eq!(extract_texts(&f.store.document_tree(&destination)).len(), 14);
        // One SEO call plus one translation call per chunk of 4 segments:
        // slice 1 has 1 + 6 segments, slices 2 and 3 have 6 and 2.
        assert_eq!(f.completion.calls().len(), 2 + 2 + 1 + 1);
    }

    #[tokio::test]
    async fn empty_document_still_creates_destination() {
        let mut f = fixture(Vec::new(), 40);
        let state = PipelineState::new(&f.source, LanguageCode::new("en"), "FIRE");
        let done = f.orchestrator.run_to_completion(state).await.unwrap();

        assert_eq!(done.total_batches, 1);
        let destination = done.destination_document_id.unwrap();
        assert!(f.store.document_tree(&destination).is_empty());
    }

    #[tokio::test]
    async fn batch_without_snapshot_is_rejected() {
        let mut f = fixture(body(1), 40);
        let mut state = PipelineState::new(&f.source, LanguageCode::new("en"), "FIRE");
        state.stage = Stage::BatchProcessing;
        state.total_batches = 1;

        let err = f.orchestrator.step(state).await.unwrap_err();
        assert!(err.to_string().contains("source properties"));
    }

    #[tokio::test]
    async fn later_batch_without_destination_is_rejected() {
        let mut f = fixture(body(3), 1);
        let state = PipelineState::new(&f.source, LanguageCode::new("en"), "FIRE");
        let mut state = f.orchestrator.step(state).await.unwrap();
        state.batch_index = 1;

        let err = f.orchestrator.step(state).await.unwrap_err();
        assert!(err.to_string().contains("destination"));
    }

    #[tokio::test]
    async fn unknown_theme_fails_analysis() {
        let mut f = fixture(body(1), 40);
        let state = PipelineState::new(&f.source, LanguageCode::new("en"), "Nope");
        assert!(f.orchestrator.step(state).await.is_err());
    }

    #[tokio::test]
    async fn internal_links_point_at_target_language_sibling() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_document("db-fire", source_props("另一篇", "src-9"), Vec::new());
        let mut sibling = source_props("Other", "src-9");
        sibling.insert(names::LANG.into(), PropertyValue::select("en"));
        sibling.insert(names::SLUG.into(), PropertyValue::text("other-en"));
        store.seed_document("db-fire", sibling, Vec::new());

        let linked = ContentNode::new(NodeKind::Paragraph(TextBlock {
            rich_text: vec![TextSpan::linked("链接", "https://playfishlab.com/fire/src-9-slug")],
            color: None,
        }));
        let source = store.seed_document("db-fire", source_props("标题", "src-1"), vec![linked]);

        let mut orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(ScriptedCompletion::prefixing()),
            config(40),
        )
        .unwrap();
        let done = orchestrator
            .run_to_completion(PipelineState::new(&source, LanguageCode::new("en"), "FIRE"))
            .await
            .unwrap();

        let written = store.document_tree(&done.destination_document_id.unwrap());
        let NodeKind::Paragraph(block) = &written[0].kind else {
            panic!("expected paragraph");
        };
        assert_eq!(block.rich_text[0].content, "EN:链接");
        assert_eq!(
            block.rich_text[0].link.as_deref(),
            Some("https://playfishlab.com/fire/other-en")
        );
    }

    #[tokio::test]
    async fn scanning_state_selects_newest_task() {
        let mut f = fixture(body(1), 40);
        let state = f.orchestrator.step(PipelineState::scanning()).await.unwrap();

        assert_eq!(state.stage, Stage::Analyzing);
        assert_eq!(state.source_document_id, f.source);
        assert_eq!(state.target_language, LanguageCode::new("en"));
        assert_eq!(state.blog_theme, "FIRE");
    }

    #[tokio::test]
    async fn run_tasks_records_failures_and_continues() {
        let f = fixture(body(2), 40);
        let Fixture {
            store,
            mut orchestrator,
            ..
        } = f;
        let broken = store.seed_document("db-fire", source_props("坏", "src-2"), body(1));
        let broken_child = store.child_ids(&broken)[0].clone();
        store.fail_listing(&broken_child);

        let tasks = orchestrator.scan().await.unwrap();
        assert_eq!(tasks.len(), 2);
        let report = orchestrator.run_tasks(&tasks, 5).await;

        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].task, "坏");
        assert_eq!(report.errors[0].language, LanguageCode::new("en"));
    }

    #[tokio::test]
    async fn run_tasks_respects_limit() {
        let mut f = fixture(body(1), 40);
        let tasks = f.orchestrator.scan().await.unwrap();
        let report = f.orchestrator.run_tasks(&tasks, 0).await;
        assert_eq!(report, RunReport::default());
    }

    #[tokio::test]
    async fn failed_write_fails_the_step() {
        let mut f = fixture(body(2), 40);
        f.store.fail_writes();
        let state = PipelineState::new(&f.source, LanguageCode::new("en"), "FIRE");
        let state = f.orchestrator.step(state).await.unwrap();
        let err = f.orchestrator.step(state).await.unwrap_err();
        assert!(matches!(err, LingoflowError::Store { .. }));
    }

    #[tokio::test]
    async fn failed_append_keeps_the_created_destination() {
        let mut f = fixture(body(2), 1);
        let state = PipelineState::new(&f.source, LanguageCode::new("en"), "FIRE");
        let state = f.orchestrator.step(state).await.unwrap();
        let state = f.orchestrator.step(state).await.unwrap();
        let destination = state.destination_document_id.clone().unwrap();

        f.store.fail_writes();
        let err = f.orchestrator.step(state.clone()).await.unwrap_err();
        assert!(matches!(err, LingoflowError::Store { .. }));

        // The caller still holds the pre-step state, which names the
        // destination, and the first slice is already in place.
        assert_eq!(state.stage, Stage::BatchProcessing);
        assert_eq!(state.batch_index, 1);
        assert_eq!(state.destination_document_id.as_deref(), Some(destination.as_str()));
        let written = f.store.document_tree(&destination);
        assert_eq!(extract_texts(&written), ["EN:段落0", "EN:子0"]);
    }

    #[tokio::test]
    async fn short_answer_for_the_title_chunk_keeps_originals_aligned() {
        let store = Arc::new(InMemoryStore::with_page_size(3));
        let source = store.seed_document("db-fire", source_props("标题", "src-1"), body(2));
        let completion = Arc::new(ScriptedCompletion::new(|req| {
            let Some(segments) = input_segments(&req.prompt) else {
                return Ok(r#"{"meta_title": "M", "description": "D", "keywords": "k"}"#.into());
            };
            let mut out: Vec<String> = segments.iter().map(|s| format!("EN:{s}")).collect();
            if segments.iter().any(|s| s == "标题") {
                out.pop();
            }
            Ok(serde_json::json!({ "segments": out }).to_string())
        }));
        let mut orchestrator = Orchestrator::new(store.clone(), completion, config(40)).unwrap();

        let done = orchestrator
            .run_to_completion(PipelineState::new(&source, LanguageCode::new("en"), "FIRE"))
            .await
            .unwrap();

        // Chunks of 4: [标题, 段落0, 子0, 段落1] comes back short, [子1] is translated.
        assert_eq!(done.translated_title.as_deref(), Some("标题"));
        let destination = done.destination_document_id.unwrap();
        let written = store.document_tree(&destination);
        assert_eq!(extract_texts(&written), ["段落0", "子0", "段落1", "EN:子1"]);
        let props = store.properties_of(&destination).unwrap();
        assert_eq!(text_of(&props, names::TITLE).as_deref(), Some("标题"));
    }

    #[tokio::test]
    async fn separate_steps_refetch_and_keep_analyzed_batch_count() {
        let mut f = fixture(body(4), 2);
        let state = PipelineState::new(&f.source, LanguageCode::new("en"), "FIRE");
        let state = f.orchestrator.step(state).await.unwrap();
        assert_eq!(state.total_batches, 2);
        let state = f.orchestrator.step(state).await.unwrap();

        // The source grows between invocations; the next step fetches it
        // again but still writes only the analyzed slices.
        f.store.append_children(&f.source, &body(6)[4..]).await.unwrap();
        let state = f.orchestrator.step(state).await.unwrap();

        assert_eq!(state.stage, Stage::Finalizing);
        assert_eq!(state.batch_index, 2);
        let destination = state.destination_document_id.unwrap();
        let expected: Vec<String> = extract_texts(&body(4))
            .into_iter()
            .map(|s| format!("EN:{s}"))
            .collect();
        assert_eq!(extract_texts(&f.store.document_tree(&destination)), expected);
        assert_eq!(f.store.write_sizes(&destination), [2, 2]);
    }

    #[tokio::test]
    async fn state_serializes_with_snake_case_stage() {
        let state = PipelineState::new("doc-1", LanguageCode::new("en"), "FIRE");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["stage"], "analyzing");
        assert_eq!(json["target_language"], "en");
        assert!(json.get("destination_document_id").is_none());
    }
}
