//! The CLI tooling pipelines.
//!
//! Each module declares one [`ProcessDefinition`]: its tasks in order, the
//! inputs it accepts, and the review question asked once every task has
//! produced its output.

mod common;

pub mod binary_distribution;
pub mod configuration_system;
pub mod plugin_architecture;
pub mod shell_scaffolding;

use pipewright_engine::ProcessDefinition;

pub use binary_distribution::BinaryDistribution;
pub use configuration_system::ConfigurationSystem;
pub use plugin_architecture::PluginArchitecture;
pub use shell_scaffolding::ShellScaffolding;

static PROCESSES: [&'static dyn ProcessDefinition; 4] = [
    &BinaryDistribution,
    &ConfigurationSystem,
    &PluginArchitecture,
    &ShellScaffolding,
];

/// Every registered pipeline.
pub fn all() -> &'static [&'static dyn ProcessDefinition] {
    &PROCESSES
}

/// Look up a pipeline by name.
pub fn find(name: &str) -> Option<&'static dyn ProcessDefinition> {
    PROCESSES.iter().copied().find(|p| p.name() == name)
}
