// Domain-layer pipelines, models and shared errors
pub mod extraction {
    pub use crate::extraction::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod stage {
    pub use crate::stage::*;
}

pub mod orchestrator {
    pub use crate::orchestrator::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod normalization {
    pub use crate::normalization::*;
}

pub mod validation {
    pub use crate::validation::*;
}

pub mod errors {
    pub use crate::errors::*;
}
