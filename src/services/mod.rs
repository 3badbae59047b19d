//! Service layer: Redis cache, generative-model client and activity log.

pub mod activity;
pub mod ai_client;
pub mod ai_output;
pub mod cache;
pub mod prompts;

pub use ai_client::AiClient;
pub use cache::RedisCache;
