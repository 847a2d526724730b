pub mod chat;

pub use chat::{render_prompt, AnswerGenerator};
