//! Configuration module

mod site;

pub use site::AdminConfig;
pub use site::CacheConfig;
pub use site::ContentSource;
pub use site::HighlightConfig;
pub use site::ReadingConfig;
pub use site::RemoteConfig;
pub use site::SiteConfig;
