//! Generation settings and stop reasons.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Settings forwarded to the provider on every round.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
}

/// Why the provider ended its response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// The model finished its answer.
    EndTurn,
    /// The model wants tools executed before continuing.
    ToolUse,
    MaxTokens,
    StopSequence,
    Cancelled,
    Error,
    #[strum(default)]
    Other(String),
}

impl StopReason {
    /// Map an Anthropic/OpenAI/Gemini stop reason string.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "end_turn" | "stop" | "STOP" => Self::EndTurn,
            "tool_use" | "tool_calls" | "function_call" => Self::ToolUse,
            "max_tokens" | "length" | "MAX_TOKENS" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_stop_reasons_normalize() {
        assert_eq!(StopReason::from_provider("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::from_provider("tool_calls"), StopReason::ToolUse);
        assert_eq!(StopReason::from_provider("MAX_TOKENS"), StopReason::MaxTokens);
        assert_eq!(
            StopReason::from_provider("SAFETY"),
            StopReason::Other("SAFETY".into())
        );
    }

    #[test]
    fn builder_sets_fields() {
        let settings = GenerationSettings::builder()
            .max_tokens(2048)
            .temperature(0.2)
            .build();
        assert_eq!(settings.max_tokens, Some(2048));
        assert_eq!(settings.top_p, None);
    }
}
