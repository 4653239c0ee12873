pub mod charset;
pub mod headers;
pub mod multipart;
pub mod params;
pub mod traits;
