use std::fs;
use std::path::Path;

use anyhow::Context;
use atelier_contracts::events::ActivityJournal;
use atelier_contracts::gallery::{CacheUpdate, GeneratedImage, ImageCache, StoragePort};
use atelier_contracts::generation::{
    GenerationMode, GenerationRequest, GenerationResult, GenerationSettings, ValidationError,
    WeightedPrompt, MAX_INIT_IMAGE_BYTES, MAX_PROMPTS, WEIGHT_RANGE,
};
use atelier_contracts::session::{apply_setting, PromptEdit, SettingKey};

use crate::client::ImageGenerator;
use crate::codec::{encode_base64, mime_for_extension, to_data_uri};
use crate::error::{GenerationError, SessionError};

const GENERATED_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub image: GeneratedImage,
    pub result: GenerationResult,
    pub update: CacheUpdate,
}

/// Editable prompt list, settings and init image, wired to a generator and
/// the gallery cache.
pub struct GenerationSession<G: ImageGenerator, S: StoragePort> {
    generator: G,
    cache: ImageCache<S>,
    journal: Option<ActivityJournal>,
    prompts: Vec<WeightedPrompt>,
    settings: GenerationSettings,
    init_image: Option<String>,
}

impl<G: ImageGenerator, S: StoragePort> GenerationSession<G, S> {
    pub fn new(generator: G, cache: ImageCache<S>) -> Self {
        Self {
            generator,
            cache,
            journal: None,
            prompts: vec![WeightedPrompt::default()],
            settings: GenerationSettings::default(),
            init_image: None,
        }
    }

    pub fn with_journal(mut self, journal: ActivityJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn cache(&self) -> &ImageCache<S> {
        &self.cache
    }

    pub fn prompts(&self) -> &[WeightedPrompt] {
        &self.prompts
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn init_image(&self) -> Option<&str> {
        self.init_image.as_deref()
    }

    /// Replaces the whole prompt list. An empty list becomes one empty prompt.
    pub fn set_prompts(&mut self, prompts: Vec<WeightedPrompt>) -> Result<(), SessionError> {
        if prompts.len() > MAX_PROMPTS {
            return Err(ValidationError::TooManyPrompts(prompts.len()).into());
        }
        for prompt in &prompts {
            check_weight(prompt.weight)?;
        }
        self.prompts = if prompts.is_empty() {
            vec![WeightedPrompt::default()]
        } else {
            prompts
        };
        Ok(())
    }

    pub fn add_prompt(&mut self, prompt: WeightedPrompt) -> Result<(), SessionError> {
        if self.prompts.len() >= MAX_PROMPTS {
            return Err(ValidationError::TooManyPrompts(self.prompts.len() + 1).into());
        }
        check_weight(prompt.weight)?;
        self.prompts.push(prompt);
        Ok(())
    }

    /// Removes the prompt at `index`. Removing the only prompt leaves one
    /// empty prompt behind.
    pub fn remove_prompt(&mut self, index: usize) -> Result<WeightedPrompt, SessionError> {
        if index >= self.prompts.len() {
            return Err(SessionError::NoSuchPrompt(index + 1));
        }
        let removed = self.prompts.remove(index);
        if self.prompts.is_empty() {
            self.prompts.push(WeightedPrompt::default());
        }
        Ok(removed)
    }

    pub fn set_prompt(
        &mut self,
        index: usize,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        let prompt = self
            .prompts
            .get_mut(index)
            .ok_or(SessionError::NoSuchPrompt(index + 1))?;
        prompt.text = text.into();
        Ok(())
    }

    pub fn set_weight(&mut self, index: usize, weight: f64) -> Result<(), SessionError> {
        check_weight(weight)?;
        let prompt = self
            .prompts
            .get_mut(index)
            .ok_or(SessionError::NoSuchPrompt(index + 1))?;
        prompt.weight = weight;
        Ok(())
    }

    /// Applies an edit addressed by 1-based position.
    pub fn apply_edit(&mut self, edit: PromptEdit) -> Result<(), SessionError> {
        match edit {
            PromptEdit::Add(prompt) => self.add_prompt(prompt),
            PromptEdit::Remove(position) => self.remove_prompt(zero_based(position)?).map(|_| ()),
            PromptEdit::Weight { position, weight } => {
                self.set_weight(zero_based(position)?, weight)
            }
            PromptEdit::Set { position, text } => self.set_prompt(zero_based(position)?, text),
        }
    }

    pub fn set_settings(&mut self, settings: GenerationSettings) {
        self.settings = settings;
    }

    pub fn apply_setting(&mut self, key: SettingKey, raw: &str) -> Result<(), ValidationError> {
        apply_setting(&mut self.settings, key, raw)
    }

    pub fn set_init_image(&mut self, data_uri: Option<String>) {
        self.init_image = data_uri.filter(|value| !value.trim().is_empty());
    }

    /// Reads an image file into the session as a data URI. Files over the
    /// upload cap are refused. Returns the file size.
    pub fn load_init_image(&mut self, path: &Path) -> anyhow::Result<usize> {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        if bytes.len() > MAX_INIT_IMAGE_BYTES {
            return Err(ValidationError::ImageTooLarge(bytes.len()).into());
        }
        let mime = mime_for_extension(
            path.extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or_default(),
        );
        self.init_image = Some(to_data_uri(mime, &encode_base64(&bytes)));
        tracing::debug!(path = %path.display(), bytes = bytes.len(), mime, "init image loaded");
        Ok(bytes.len())
    }

    pub fn request(&self) -> GenerationRequest {
        GenerationRequest {
            prompts: self.prompts.clone(),
            settings: self.settings.clone(),
            init_image: self.init_image.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.request().validate()
    }

    /// Runs one generation with the current state and stores the result in
    /// the gallery. After a successful image-to-image or upscale run the init
    /// image is cleared.
    pub fn submit(&mut self) -> Result<GenerationOutcome, GenerationError> {
        let request = self.request();
        request.validate()?;
        self.journal(|journal| journal.generation_started(&request));

        let result = match self.generator.generate(&request) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    generator = self.generator.name(),
                    mode = %request.mode(),
                    error = %err,
                    "generation failed"
                );
                let message = err.to_string();
                self.journal(|journal| journal.generation_failed(&request, &message));
                return Err(err);
            }
        };

        let image = GeneratedImage::new(
            to_data_uri(GENERATED_MIME, &result.image_base64),
            request.display_prompt(),
            request.settings.clone(),
        );
        let update = self.cache.add(image.clone());
        tracing::info!(
            generator = self.generator.name(),
            mode = %request.mode(),
            image_id = %image.id,
            seed = result.seed,
            evicted = update.evicted.len(),
            "image generated"
        );
        self.journal(|journal| {
            journal.generation_finished(&image, result.seed, &result.finish_reason)
        });
        self.journal(|journal| journal.image_cached(&image.id, &update));

        if request.mode() != GenerationMode::TextToImage {
            self.init_image = None;
        }
        Ok(GenerationOutcome {
            image,
            result,
            update,
        })
    }

    pub fn remove_image(&self, id: &str) -> bool {
        let removed = self.cache.remove(id);
        self.journal(|journal| journal.image_removed(id, removed));
        removed
    }

    pub fn clear_gallery(&self) {
        self.cache.clear();
        self.journal(ActivityJournal::gallery_cleared);
    }

    fn journal<F>(&self, write: F)
    where
        F: FnOnce(&ActivityJournal) -> anyhow::Result<serde_json::Value>,
    {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(err) = write(journal) {
            tracing::warn!(
                path = %journal.path().display(),
                error = %err,
                "activity journal write failed"
            );
        }
    }
}

fn zero_based(position: usize) -> Result<usize, SessionError> {
    position
        .checked_sub(1)
        .ok_or(SessionError::NoSuchPrompt(position))
}

fn check_weight(weight: f64) -> Result<(), ValidationError> {
    let (min, max) = WEIGHT_RANGE;
    if weight.is_nan() || weight < min || weight > max {
        return Err(ValidationError::OutOfRange {
            field: "weight",
            value: weight,
            min,
            max,
        });
    }
    Ok(())
}
