//! Tool discovery, validation and execution.

pub mod dispatch;
mod errors;
pub mod registry;
pub mod schema;
mod transport;

pub use dispatch::{DispatchOptions, Dispatcher, EMPTY_SUCCESS};
pub use errors::ToolError;
pub use registry::{Catalog, Diagnostic, ToolRegistry};
pub use schema::{
    ArgumentError, ExtraArguments, InvocationContract, ParamKind, ParameterSpec, SchemaError,
    ValidationError, translate,
};
pub use transport::ToolTransport;
