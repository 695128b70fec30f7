//! Orchestrates the pipeline stages that turn a short topic into scene
//! prose: spec, outline, enhanced outline, scene breakdown, scenes.

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};

use crate::book_spec::{parse_book_spec, BOOK_SPEC_FIELDS};
use crate::config::Config;
use crate::llm::{create_llm, LlmClient, Message};
use crate::plan::{self, Plan, PlanParse};
use crate::prompts;
use crate::utils;

pub struct StoryAgent {
    config: Config,
    llm: Box<dyn LlmClient>,
}

impl StoryAgent {
    pub fn new(config: Config) -> Result<Self> {
        let llm = create_llm(&config)?;
        Ok(Self { config, llm })
    }

    /// Builds an agent around an existing client, bypassing the factory.
    pub fn with_client(config: Config, llm: Box<dyn LlmClient>) -> Self {
        Self { config, llm }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Queries the backend, degrading any transport failure to empty text.
    /// Empty replies then drive each stage's own retry policy.
    async fn query_chat(&self, messages: &[Message], use_scene_options: bool) -> String {
        let options = if use_scene_options {
            &self.config.scene_sampling
        } else {
            &self.config.sampling
        };
        debug!("querying backend with {} messages", messages.len());
        match self.llm.complete(messages, options).await {
            Ok(text) => text,
            Err(e) => {
                error!("completion failed: {e:#}");
                String::new()
            }
        }
    }

    /// One trivial round-trip to verify the backend is reachable.
    pub async fn check_connection(&self) -> Result<()> {
        let messages = vec![
            Message::system("You are a helpful assistant."),
            Message::user("Reply with the single word: ready"),
        ];
        let reply = self.llm.complete(&messages, &self.config.sampling).await?;
        if reply.trim().is_empty() {
            anyhow::bail!("backend returned an empty reply");
        }
        debug!("backend replied: {reply}");
        Ok(())
    }

    /// Creates the initial book specification for a topic, issuing targeted
    /// follow-up requests until every field has a value.
    pub async fn init_book_spec(&self, topic: &str) -> Result<String> {
        let form = self.config.generation.form;
        let messages = prompts::init_book_spec_messages(topic, form);
        let text_spec = self.query_chat(&messages, false).await;
        let mut spec = parse_book_spec(&text_spec);

        let spec_text = spec.to_string();
        for field in BOOK_SPEC_FIELDS {
            let mut attempts = 0;
            while spec.get(field).map_or(true, |v| v.trim().is_empty()) {
                attempts += 1;
                if attempts > self.config.generation.max_stage_retries {
                    return Err(anyhow!(
                        "gave up filling book spec field '{field}' after {} attempts",
                        attempts - 1
                    ));
                }
                let messages = prompts::missing_book_spec_messages(field, &spec_text);
                let missing_part = self.query_chat(&messages, false).await;
                if let Some((key, value)) = missing_part.split_once(':') {
                    if key.trim().eq_ignore_ascii_case(field) {
                        spec.set(field, value.trim());
                    }
                }
            }
        }
        Ok(spec.to_string())
    }

    /// Makes the specification more detailed. Fields the backend drops fall
    /// back to their previous values, so no field ever comes back empty.
    pub async fn enhance_book_spec(&self, book_spec: &str) -> Result<String> {
        let form = self.config.generation.form;
        let messages = prompts::enhance_book_spec_messages(book_spec, form);
        let text_spec = self.query_chat(&messages, false).await;

        let old_spec = parse_book_spec(book_spec);
        let mut new_spec = parse_book_spec(&text_spec);
        new_spec.fill_missing_from(&old_spec);
        Ok(new_spec.to_string())
    }

    /// Requests a full three-act outline until it parses into a usable plan.
    pub async fn create_plot_chapters(&self, book_spec: &str) -> Result<Plan> {
        let form = self.config.generation.form;
        let messages = prompts::create_plot_chapters_messages(book_spec, form);
        let max_attempts = self.config.generation.max_stage_retries;
        for attempt in 1..=max_attempts {
            let text_plan = self.query_chat(&messages, false).await;
            if text_plan.is_empty() {
                continue;
            }
            match plan::parse_text_plan(&text_plan) {
                PlanParse::Parsed(plan) => return Ok(plan),
                PlanParse::Partial(plan) => {
                    warn!("outline parsed into {} acts, keeping it", plan.acts.len());
                    return Ok(plan);
                }
                PlanParse::Empty => {
                    warn!("could not parse outline (attempt {attempt}/{max_attempts})");
                }
            }
        }
        Err(anyhow!(
            "gave up creating a plot outline after {max_attempts} attempts"
        ))
    }

    /// Rewrites each act in turn for a more engaging flow. Later acts see
    /// the already-enhanced text of earlier ones.
    pub async fn enhance_plot_chapters(&self, book_spec: &str, mut plan: Plan) -> Result<Plan> {
        let form = self.config.generation.form;
        let max_attempts = self.config.generation.max_stage_retries;
        let mut text_plan = plan.to_text();

        for act_idx in 0..plan.acts.len() {
            let messages = prompts::enhance_plot_chapters_messages(
                act_idx + 1,
                &text_plan,
                book_spec,
                form,
            );
            let mut enhanced = None;
            for _ in 0..max_attempts {
                let act_text = self.query_chat(&messages, false).await;
                if act_text.is_empty() {
                    continue;
                }
                let act = plan::parse_act(&act_text);
                // An act that lost its chapters is not an enhancement.
                if act.chapters.len() >= 2 {
                    enhanced = Some(act);
                    break;
                }
                warn!(
                    "enhanced act {} came back with {} chapters, retrying",
                    act_idx + 1,
                    act.chapters.len()
                );
            }
            match enhanced {
                Some(act) => {
                    plan.acts[act_idx] = act;
                    text_plan = plan.to_text();
                }
                None => warn!(
                    "keeping original act {} after {max_attempts} failed enhancement attempts",
                    act_idx + 1
                ),
            }
        }
        Ok(plan)
    }

    /// Breaks every chapter into scenes: one request per act, then a parse
    /// pass reconciling the listings against each act's chapter numbers.
    pub async fn split_chapters_into_scenes(&self, mut plan: Plan) -> Result<Plan> {
        let form = self.config.generation.form;

        let mut act_chapter_nums = Vec::with_capacity(plan.acts.len());
        for act_idx in 0..plan.acts.len() {
            let (text_act, chs) = plan.act_to_text(act_idx + 1);
            let messages =
                prompts::split_chapters_into_scenes_messages(act_idx + 1, &text_act, form);
            let act_scenes = self.query_chat(&messages, false).await;
            plan.acts[act_idx].act_scenes = Some(act_scenes);
            act_chapter_nums.push(chs);
        }

        for (act, chs) in plan.acts.iter_mut().zip(act_chapter_nums.iter()) {
            let raw = act.act_scenes.as_deref().unwrap_or_default();
            act.chapter_scenes = plan::parse_act_scenes(raw, chs);
        }
        Ok(plan)
    }

    /// Generates one scene's prose, conditioned on the windowed tail of the
    /// previous scene when there is one.
    pub async fn write_a_scene(
        &self,
        scene: &str,
        sc_num: usize,
        ch_num: usize,
        plan: &Plan,
        previous_scene: Option<&str>,
    ) -> Result<String> {
        let text_plan = plan.to_text();
        let mut messages =
            prompts::scene_messages(scene, sc_num, ch_num, &text_plan, self.config.generation.form);
        if let Some(previous) = previous_scene {
            let tail =
                utils::keep_last_n_words(previous, self.config.generation.context_window_words);
            if let Some(user) = messages.last_mut() {
                user.append_content(&format!("{}\"\"\"{}\"\"\"", prompts::PREV_SCENE_INTRO, tail));
            }
        }
        let generated = self.query_chat(&messages, true).await;
        Ok(prepare_scene_text(&generated))
    }

    /// Re-issues a scene request conditioned on the scene's own partial
    /// text, for resuming a generation that was cut off.
    pub async fn continue_a_scene(
        &self,
        scene: &str,
        sc_num: usize,
        ch_num: usize,
        plan: &Plan,
        current_scene: Option<&str>,
    ) -> Result<String> {
        let text_plan = plan.to_text();
        let mut messages =
            prompts::scene_messages(scene, sc_num, ch_num, &text_plan, self.config.generation.form);
        if let Some(current) = current_scene {
            let tail =
                utils::keep_last_n_words(current, self.config.generation.context_window_words);
            if let Some(user) = messages.last_mut() {
                user.append_content(&format!("{}\"\"\"{}\"\"\"", prompts::CUR_SCENE_INTRO, tail));
            }
        }
        let generated = self.query_chat(&messages, true).await;
        Ok(prepare_scene_text(&generated))
    }

    /// Runs the whole pipeline and returns the generated scenes in
    /// chapter/scene order.
    pub async fn generate_story(&self, topic: &str) -> Result<Vec<String>> {
        info!("creating book specification for topic '{topic}'");
        let book_spec = self.init_book_spec(topic).await?;
        let book_spec = self.enhance_book_spec(&book_spec).await?;

        info!("creating plot outline");
        let plan = self.create_plot_chapters(&book_spec).await?;
        let plan = self.enhance_plot_chapters(&book_spec, plan).await?;

        info!("breaking chapters into scenes");
        let plan = self.split_chapters_into_scenes(plan).await?;

        let mut form_text: Vec<String> = Vec::new();
        for act in &plan.acts {
            for (ch_num, scenes) in &act.chapter_scenes {
                for (sc_idx, scene) in scenes.iter().enumerate() {
                    let sc_num = sc_idx + 1;
                    info!("writing chapter {ch_num}, scene {sc_num}");
                    let previous_scene = form_text.last().map(String::as_str);
                    let generated = self
                        .write_a_scene(scene, sc_num, *ch_num, &plan, previous_scene)
                        .await?;
                    form_text.push(generated);
                }
            }
        }
        Ok(form_text)
    }
}

/// Cleans up generated scene text: drops echoed "Chapter N"/"Scene N"
/// heading lines near the top and truncates at the first line that starts
/// a new chapter or scene, guarding against over-generation.
pub fn prepare_scene_text(text: &str) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();

    if let Some(i) = lines.iter().take(5).rposition(|l| l.contains("Chapter ")) {
        lines.drain(..=i);
    }
    if let Some(i) = lines.iter().take(5).rposition(|l| l.contains("Scene ")) {
        lines.drain(..=i);
    }
    if let Some(i) = lines
        .iter()
        .position(|l| l.starts_with("Chapter ") || l.starts_with("Scene "))
    {
        lines.truncate(i);
    }

    lines.join("\n")
}
