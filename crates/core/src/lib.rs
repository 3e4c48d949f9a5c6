pub mod config;
pub mod error;
pub mod integrations;
pub mod registry;

pub use config::{ConfigDocument, ConfigStore, Credentials, Integration, CONFIG_ENV};
pub use error::{ErrorKind, ToolError, ToolResult};
pub use integrations::{HueAdapter, LightUpdate, MacOsAdapter, VaillantAdapter};
pub use registry::{list_tools, DispatchError, Dispatcher, Tool, ToolDefinition};
