//! ConfigStore data types
//!
//! AI analysis, monitoring and classification settings. Every field carries a
//! serde default so partial files still load.

use serde::{Deserialize, Serialize};

/// Prompt shipped when no configuration file overrides it
pub const DEFAULT_PROMPT: &str = "You are an expert 3D printing technician analyzing a camera feed. \
Your job is to determine if the CURRENT PRINT is successful or failing.\n\n\
ONLY report failures for ACTUAL PRINT PROBLEMS: warped, curled or deformed prints, \
prints detached from the bed, clogged extruders, prints that have fallen over, \
spaghetti instead of proper layers.\n\n\
A dirty or used print bed is NORMAL and OKAY. Focus only on the current print object.\n\n\
Start your answer with one of:\n\
'✅ PRINT LOOKS GOOD: [why]'\n\
'⚠️ POTENTIAL ISSUE: [describe the problem]'\n\
'❌ PRINT FAILURE: [what went wrong]'\n\
'🤷 NO PRINTER VISIBLE: [what you see instead]'";

/// Root of the AI configuration file (`ai_config.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AiConfig {
    pub gemini_settings: GeminiSettings,
    pub analysis_settings: AnalysisSettings,
    pub monitoring_settings: MonitoringSettings,
    pub keyword_settings: KeywordSettings,
}

/// Prompt and sampling parameters sent with every analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            temperature: 0.3,
            max_output_tokens: 1024,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

/// Timeout and retry policy for the analysis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 25,
            retry_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

/// Capture interval bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub default_interval_seconds: u64,
    pub min_interval_seconds: u64,
    pub max_interval_seconds: u64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            default_interval_seconds: 30,
            min_interval_seconds: 5,
            max_interval_seconds: 60,
        }
    }
}

impl MonitoringSettings {
    /// Clamp an interval into `[min, max]`
    pub fn clamp_interval(&self, seconds: u64) -> u64 {
        seconds.clamp(self.min_interval_seconds, self.max_interval_seconds)
    }
}

/// Keyword groups used to classify the service's free-form answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordSettings {
    pub failure: Vec<String>,
    pub warning: Vec<String>,
    pub completed: Vec<String>,
    pub good: Vec<String>,
    pub no_printer: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for KeywordSettings {
    fn default() -> Self {
        Self {
            failure: words(&[
                "print failure",
                "❌",
                "failed",
                "failure",
                "spaghetti",
                "detached",
                "warped",
                "melted",
                "broken",
                "collapsed",
            ]),
            warning: words(&[
                "potential issue",
                "⚠️",
                "problem",
                "issue",
                "concern",
                "warning",
            ]),
            completed: words(&["print complete", "print finished", "finished printing"]),
            good: words(&[
                "print looks good",
                "✅",
                "good",
                "excellent",
                "perfect",
                "normal",
            ]),
            no_printer: words(&["no printer visible", "🤷", "no printer", "not visible"]),
        }
    }
}

impl AiConfig {
    /// Bring out-of-range values back to usable ones
    ///
    /// Malformed values never abort startup; they are replaced or clamped and
    /// a warning is logged.
    pub fn sanitized(mut self) -> Self {
        let defaults = AiConfig::default();

        let g = &mut self.gemini_settings;
        if g.prompt.trim().is_empty() {
            tracing::warn!("Empty prompt in AI config, using default prompt");
            g.prompt = defaults.gemini_settings.prompt.clone();
        }
        if !g.temperature.is_finite() {
            g.temperature = defaults.gemini_settings.temperature;
        }
        g.temperature = g.temperature.clamp(0.0, 2.0);
        if !g.top_p.is_finite() {
            g.top_p = defaults.gemini_settings.top_p;
        }
        g.top_p = g.top_p.clamp(0.0, 1.0);
        if g.max_output_tokens == 0 {
            g.max_output_tokens = defaults.gemini_settings.max_output_tokens;
        }
        if g.top_k == 0 {
            g.top_k = defaults.gemini_settings.top_k;
        }

        let a = &mut self.analysis_settings;
        if a.timeout_seconds == 0 {
            a.timeout_seconds = defaults.analysis_settings.timeout_seconds;
        }

        let m = &mut self.monitoring_settings;
        if m.min_interval_seconds == 0 {
            m.min_interval_seconds = 1;
        }
        if m.min_interval_seconds > m.max_interval_seconds {
            tracing::warn!(
                min = m.min_interval_seconds,
                max = m.max_interval_seconds,
                "Interval bounds inverted in AI config, using defaults"
            );
            m.min_interval_seconds = defaults.monitoring_settings.min_interval_seconds;
            m.max_interval_seconds = defaults.monitoring_settings.max_interval_seconds;
        }
        m.default_interval_seconds = m.clamp_interval(m.default_interval_seconds);

        self
    }
}
