pub mod agent;
pub mod book_spec;
pub mod config;
pub mod llm;
pub mod plan;
pub mod prompts;
pub mod utils;

pub use agent::{prepare_scene_text, StoryAgent};
pub use book_spec::{parse_book_spec, BookSpec, BOOK_SPEC_FIELDS};
pub use config::Config;
pub use llm::{create_llm, LlmClient, Message, Role, SamplingOptions};
pub use plan::{Act, Plan, PlanParse};
pub use prompts::StoryForm;
