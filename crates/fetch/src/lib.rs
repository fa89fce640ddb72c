pub mod browser;
pub mod html;
pub mod http;

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;
