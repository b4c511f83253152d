//! Schema-driven REST/CRUD over MySQL: `/{database}/{table}/{key}` paths are
//! resolved against the live schema and turned into parameterized statements.

pub mod binder;
pub mod catalog;
pub mod codegen;
pub mod dispatch;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod path;
pub mod redact;
pub mod response;
pub mod routes;
pub mod sanitize;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use binder::{bind_request_values, BoundValue, FieldValue, RequestFields, RowProjection};
pub use catalog::{Catalog, ColumnDescriptor, KeyRole, MemoryCatalog, SemanticType};
pub use dispatch::{ChangeEvent, ChangeKind, Dispatcher, Reply};
pub use error::{AppError, SettingsError};
pub use path::{assemble, resolve, Depth, ResourceDescriptor};
pub use redact::Redactor;
pub use routes::{common_routes, common_routes_with_ready, rest_routes};
pub use settings::{ServerSettings, Settings};
pub use sql::{Statement, TableSchema};
pub use state::{follow_changes, AppState};
pub use store::{ExecOutcome, Executor, MySqlStore, Row};
