mod binding;
mod debounce;
mod descriptor;
mod error;
mod fetch;
mod host;
mod meta;
mod options;
mod resolver;
mod state;
mod stream_ext;
mod view_model;
pub mod mock;

pub use binding::*;
pub use debounce::*;
pub use descriptor::*;
pub use error::*;
pub use fetch::*;
pub use host::*;
pub use meta::*;
pub use options::*;
pub use resolver::*;
pub use state::*;
pub use stream_ext::*;
pub use view_model::*;

#[cfg(test)]
mod unit_tests;
