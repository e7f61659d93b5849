// Public modules
pub mod chat_completion;
pub mod chat_completion_chunk;
pub mod chat_completion_params;
pub mod model_list;
pub mod turn;
pub mod usage;

// Re-exports
pub use chat_completion::{ChatCompletion, Choice, ChoiceMessage};
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_completion_params::{ChatCompletionParams, StreamOptions};
pub use model_list::{ModelInfo, ModelList};
pub use turn::{Role, Turn};
pub use usage::Usage;
