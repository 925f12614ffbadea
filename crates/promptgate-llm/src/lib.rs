pub mod azure;
pub mod format;
pub mod normalize;
pub mod prompts;
pub mod provider;
pub mod types;

pub use azure::AzureOpenAiClient;
pub use format::{FormattedReply, ReplyChoice, format_reply};
pub use normalize::{build_model_args, normalize_messages};
pub use prompts::{ContextKey, PromptSelector};
pub use provider::{CompletionClient, RawCompletion};
pub use types::{ChatMessage, ChatRole, ConversationRequest, ModelArgs};
