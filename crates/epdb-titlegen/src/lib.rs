pub mod batch;
pub mod clean;
pub mod client;
pub mod error;
pub mod outcome;
pub mod prompt;
pub mod provider;
mod types;

pub use batch::{generate_batch, GeneratedTitle, TitleRequest, DEFAULT_TITLE_COUNT, MAX_TITLE_COUNT};
pub use clean::clean_title;
pub use client::{
    GenerationSettings, TitleClient, DEFAULT_GEMINI_BASE_URL, DEFAULT_OPENAI_BASE_URL,
};
pub use error::TitleGenError;
pub use outcome::{fallback_title, TitleOutcome, TitleSource};
pub use prompt::{city_prompt, TitleCategory, CATEGORIES};
pub use provider::Provider;
