pub mod analyzer;
pub mod cycle;
pub mod dispatch;
pub mod llm;
pub mod personas;
pub mod synthesizer;
pub mod terminal;
pub mod transcript;
