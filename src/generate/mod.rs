pub mod bindings;
pub mod cleaner;
pub mod common_steps;
pub mod flows;
pub mod pipeline;
pub mod prompts;
pub mod scenario;
pub mod validator;
