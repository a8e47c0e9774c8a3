//! Public types for the Switchboard API.

mod capabilities;
mod generate;
mod message;
mod response;
mod tool;

pub use capabilities::{
    CostClass, Deployment, LatencyClass, Pricing, ProviderCapabilities, QualityTier,
    RequiredCapabilities,
};
pub use generate::{GenerateEvent, GenerateOptions, GenerateRequest, GenerateResponse};
pub use message::{ContentPart, Message, MessageContent, Role, estimate_tokens};
pub use response::{FinishReason, Usage};
pub use tool::{ToolCall, ToolDefinition};
