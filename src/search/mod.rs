//! Search clients — web (Google Custom Search) and academic (Semantic Scholar).
//!
//! Both clients follow the chat provider's HTTP idiom: private wire types,
//! per-client timeout, HTTP errors decoded into `AppError::Search`. A failed
//! search never aborts a research turn; the loop logs it and continues with
//! whatever evidence it already has.

pub mod google;
pub mod semantic_scholar;

pub use google::{WebHit, WebSearch};
pub use semantic_scholar::{PaperHit, PaperSearch};
