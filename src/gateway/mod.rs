//! Routing gateway: builder, request/response types and fallback dispatch.

mod builder;
mod dispatch;
mod request;
mod response;
mod switchboard;

pub use builder::SwitchboardBuilder;
pub use dispatch::FallbackConfig;
pub use request::RouteRequest;
pub use response::{Provenance, ProviderStats, RoutedResponse, RoutedStream};
pub use switchboard::Switchboard;
