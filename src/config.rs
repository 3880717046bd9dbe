use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::generate::ReasoningEffort;

/// Requested output length, in words (characters for CJK output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LengthRange {
    pub min: u32,
    pub max: u32,
}

impl LengthRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// Settings for one prompt call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallSite {
    /// Content longer than this many characters is cut before prompting.
    pub truncation_ceiling: usize,
    pub length: LengthRange,
}

/// Target length of refine step `i`: `min(base + step * i, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefineGrowth {
    pub base: u32,
    pub step: u32,
    pub cap: u32,
}

impl RefineGrowth {
    pub fn target_for(&self, chapter_index: usize) -> u32 {
        let index = u32::try_from(chapter_index).unwrap_or(u32::MAX);
        self.base
            .saturating_add(self.step.saturating_mul(index))
            .min(self.cap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefineSite {
    pub truncation_ceiling: usize,
    pub growth: RefineGrowth,
}

/// How the generation client reacts to an empty visible output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_retries: usize,
    /// Output budget multiplier applied on every retry.
    pub budget_multiplier: u32,
    pub max_output_tokens_cap: u32,
    /// Step reasoning effort down one level on every retry.
    pub lower_effort: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            budget_multiplier: 2,
            max_output_tokens_cap: 16_384,
            lower_effort: true,
        }
    }
}

// Config file shapes. Every field is optional and overlays the default of
// its own call site.

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LengthRangeFile {
    min: Option<u32>,
    max: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CallSiteFile {
    truncation_ceiling: Option<usize>,
    length: LengthRangeFile,
}

impl CallSiteFile {
    fn merge_into(self, site: &mut CallSite) {
        if let Some(ceiling) = self.truncation_ceiling {
            site.truncation_ceiling = ceiling;
        }
        if let Some(min) = self.length.min {
            site.length.min = min;
        }
        if let Some(max) = self.length.max {
            site.length.max = max;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RefineGrowthFile {
    base: Option<u32>,
    step: Option<u32>,
    cap: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RefineSiteFile {
    truncation_ceiling: Option<usize>,
    growth: RefineGrowthFile,
}

impl RefineSiteFile {
    fn merge_into(self, site: &mut RefineSite) {
        if let Some(ceiling) = self.truncation_ceiling {
            site.truncation_ceiling = ceiling;
        }
        if let Some(base) = self.growth.base {
            site.growth.base = base;
        }
        if let Some(step) = self.growth.step {
            site.growth.step = step;
        }
        if let Some(cap) = self.growth.cap {
            site.growth.cap = cap;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    language: Option<String>,
    chapter: CallSiteFile,
    book: CallSiteFile,
    seed: CallSiteFile,
    refine: RefineSiteFile,
    finalize: CallSiteFile,
    retry: Option<RetryPolicy>,
    max_output_tokens: Option<u32>,
    reasoning_effort: Option<ReasoningEffort>,
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
}

impl From<ConfigFile> for SummaryConfig {
    fn from(file: ConfigFile) -> Self {
        let mut config = Self::default();
        if let Some(language) = file.language {
            config.language = language;
        }
        file.chapter.merge_into(&mut config.chapter);
        file.book.merge_into(&mut config.book);
        file.seed.merge_into(&mut config.seed);
        file.refine.merge_into(&mut config.refine);
        file.finalize.merge_into(&mut config.finalize);
        if let Some(retry) = file.retry {
            config.retry = retry;
        }
        if let Some(max_output_tokens) = file.max_output_tokens {
            config.max_output_tokens = max_output_tokens;
        }
        if file.reasoning_effort.is_some() {
            config.reasoning_effort = file.reasoning_effort;
        }
        if let Some(concurrency) = file.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout_secs) = file.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct SummaryConfig {
    /// Output language tag, passed verbatim into every prompt.
    pub language: String,
    pub chapter: CallSite,
    pub book: CallSite,
    pub seed: CallSite,
    pub refine: RefineSite,
    pub finalize: CallSite,
    pub retry: RetryPolicy,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Concurrent chapter calls in the map-reduce strategy.
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            language: "zh-TW".to_owned(),
            chapter: CallSite {
                truncation_ceiling: 300_000,
                length: LengthRange::new(150, 300),
            },
            book: CallSite {
                truncation_ceiling: 300_000,
                length: LengthRange::new(500, 800),
            },
            seed: CallSite {
                truncation_ceiling: 200_000,
                length: LengthRange::new(200, 400),
            },
            refine: RefineSite {
                truncation_ceiling: 200_000,
                growth: RefineGrowth {
                    base: 300,
                    step: 50,
                    cap: 800,
                },
            },
            finalize: CallSite {
                truncation_ceiling: 300_000,
                length: LengthRange::new(500, 800),
            },
            retry: RetryPolicy::default(),
            max_output_tokens: 1024,
            reasoning_effort: None,
            concurrency: 4,
            timeout_secs: 300,
        }
    }
}

/// Command-line overrides applied on top of the file/default config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub language: Option<String>,
    pub concurrency: Option<usize>,
    pub retries: Option<usize>,
    pub max_output_tokens: Option<u32>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub timeout_secs: Option<u64>,
}

impl SummaryConfig {
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config: {}", path.display()))?;
                serde_yaml::from_str::<Self>(&raw)
                    .with_context(|| format!("parse config yaml: {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(language) = overrides.language.as_deref() {
            self.language = language.to_owned();
        }
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(retries) = overrides.retries {
            self.retry.max_retries = retries;
        }
        if let Some(max_output_tokens) = overrides.max_output_tokens {
            self.max_output_tokens = max_output_tokens;
        }
        if let Some(effort) = overrides.reasoning_effort {
            self.reasoning_effort = Some(effort);
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        self.concurrency = self.concurrency.max(1);
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.language.trim().is_empty() {
            anyhow::bail!("language must not be empty");
        }
        for (name, site) in [
            ("chapter", &self.chapter),
            ("book", &self.book),
            ("seed", &self.seed),
            ("finalize", &self.finalize),
        ] {
            if site.truncation_ceiling == 0 {
                anyhow::bail!("{name}.truncation_ceiling must be > 0");
            }
            if site.length.min > site.length.max {
                anyhow::bail!(
                    "{name}.length.min ({}) must be <= {name}.length.max ({})",
                    site.length.min,
                    site.length.max
                );
            }
        }
        if self.refine.truncation_ceiling == 0 {
            anyhow::bail!("refine.truncation_ceiling must be > 0");
        }
        if self.max_output_tokens == 0 {
            anyhow::bail!("max_output_tokens must be > 0");
        }
        if self.retry.budget_multiplier == 0 {
            anyhow::bail!("retry.budget_multiplier must be > 0");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be > 0");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
