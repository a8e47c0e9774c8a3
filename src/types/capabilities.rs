//! Provider capability metadata and the coarse classes scoring works with.

use serde::{Deserialize, Serialize};

/// Static capabilities an adapter reports once, at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCapabilities {
    /// Maximum context window in tokens.
    pub max_context_tokens: usize,
    pub supports_tools: bool,
    pub supports_vision: bool,
    pub supports_streaming: bool,
    pub supports_json_mode: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            max_context_tokens: 8_192,
            supports_tools: false,
            supports_vision: false,
            supports_streaming: true,
            supports_json_mode: false,
        }
    }
}

impl ProviderCapabilities {
    pub fn max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    pub fn tools(mut self, supported: bool) -> Self {
        self.supports_tools = supported;
        self
    }

    pub fn vision(mut self, supported: bool) -> Self {
        self.supports_vision = supported;
        self
    }

    pub fn streaming(mut self, supported: bool) -> Self {
        self.supports_streaming = supported;
        self
    }

    pub fn json_mode(mut self, supported: bool) -> Self {
        self.supports_json_mode = supported;
        self
    }
}

/// Capabilities a request cannot be served without.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredCapabilities {
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub json_mode: bool,
}

impl RequiredCapabilities {
    /// First requirement `caps` fails, if any.
    pub fn missing_from(&self, caps: &ProviderCapabilities) -> Option<&'static str> {
        if self.tools && !caps.supports_tools {
            Some("tool calling")
        } else if self.vision && !caps.supports_vision {
            Some("vision")
        } else if self.streaming && !caps.supports_streaming {
            Some("streaming")
        } else if self.json_mode && !caps.supports_json_mode {
            Some("json mode")
        } else {
            None
        }
    }
}

/// Price per 1k tokens in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub input_per_1k: f64,
    #[serde(default)]
    pub output_per_1k: f64,
}

impl Pricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Free (local) pricing.
    pub fn free() -> Self {
        Self::default()
    }

    /// Estimated cost of one request in USD.
    pub fn estimate(&self, prompt_tokens: usize, output_tokens: usize) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.input_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

/// Where a provider runs. Drives OFFLINE_ONLY and PRIVACY_FIRST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deployment {
    /// On this machine or LAN (Ollama, llama.cpp).
    Local,
    /// Hosted, but designated privacy-preserving (no retention, own tenancy).
    PrivateCloud,
    #[default]
    Cloud,
}

impl Deployment {
    pub fn is_local(self) -> bool {
        matches!(self, Deployment::Local)
    }
}

/// Coarse model size/quality tag used by QUALITY_OPTIMIZED and BALANCED.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Large flagship models (70B+, Sonnet/Opus class).
    Flagship,
    #[default]
    Standard,
    /// Small models (≤8B, Haiku class).
    Compact,
}

/// Cost class derived from output pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostClass {
    Free,
    Low,
    Moderate,
    High,
}

impl CostClass {
    /// Local providers are always free; otherwise bucket on output price per 1k.
    pub fn classify(deployment: Deployment, pricing: &Pricing) -> Self {
        if deployment.is_local() || pricing.output_per_1k <= 0.0 {
            CostClass::Free
        } else if pricing.output_per_1k < 1.0 {
            CostClass::Low
        } else if pricing.output_per_1k < 5.0 {
            CostClass::Moderate
        } else {
            CostClass::High
        }
    }
}

/// Latency class derived from the tracked average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyClass {
    VeryFast,
    Fast,
    Moderate,
    Slow,
}

impl LatencyClass {
    pub fn from_millis(avg_latency_ms: f64) -> Self {
        if avg_latency_ms < 500.0 {
            LatencyClass::VeryFast
        } else if avg_latency_ms < 1000.0 {
            LatencyClass::Fast
        } else if avg_latency_ms < 2000.0 {
            LatencyClass::Moderate
        } else {
            LatencyClass::Slow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_class_buckets_output_price() {
        let cloud = Deployment::Cloud;
        assert_eq!(CostClass::classify(cloud, &Pricing::free()), CostClass::Free);
        assert_eq!(CostClass::classify(cloud, &Pricing::new(0.05, 0.08)), CostClass::Low);
        assert_eq!(CostClass::classify(cloud, &Pricing::new(1.25, 5.0)), CostClass::High);
        assert_eq!(CostClass::classify(cloud, &Pricing::new(0.5, 1.5)), CostClass::Moderate);
        // local is free even with a nominal price
        assert_eq!(
            CostClass::classify(Deployment::Local, &Pricing::new(1.0, 9.0)),
            CostClass::Free
        );
    }

    #[test]
    fn latency_class_boundaries() {
        assert_eq!(LatencyClass::from_millis(499.9), LatencyClass::VeryFast);
        assert_eq!(LatencyClass::from_millis(500.0), LatencyClass::Fast);
        assert_eq!(LatencyClass::from_millis(1999.0), LatencyClass::Moderate);
        assert_eq!(LatencyClass::from_millis(2000.0), LatencyClass::Slow);
    }

    #[test]
    fn pricing_estimate() {
        let pricing = Pricing::new(3.0, 15.0);
        let cost = pricing.estimate(2000, 500);
        assert!((cost - 13.5).abs() < 1e-9);
        assert_eq!(Pricing::free().estimate(10_000, 10_000), 0.0);
    }

    #[test]
    fn required_capabilities_report_first_gap() {
        let caps = ProviderCapabilities::default().tools(true);
        let req = RequiredCapabilities {
            tools: true,
            vision: true,
            ..Default::default()
        };
        assert_eq!(req.missing_from(&caps), Some("vision"));
        assert_eq!(RequiredCapabilities::default().missing_from(&caps), None);
    }
}
