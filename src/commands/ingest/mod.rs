mod orchestrator;
mod run;

pub use run::run;
