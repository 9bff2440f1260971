//! External service integrations.

pub mod completion {
    pub use crate::completion::*;
}

pub mod llm_client {
    pub use crate::llm_client::*;
}

pub mod document_source {
    pub use crate::document_source::*;
}

pub mod circuit_breaker {
    pub use crate::circuit_breaker::*;
}
