pub mod autonomy;
pub mod content;
pub mod http_cache;
pub mod llm;
pub mod persona;
