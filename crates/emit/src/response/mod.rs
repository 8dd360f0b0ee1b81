//! Response state and emission control.
//!
//! [`Response`] owns the status line, header map and protocol version
//! for one exchange, negotiates the body pipeline once, and settles the
//! connection when the exchange ends. The content-type knowledge needed
//! during negotiation stays with the serving layer behind [`MimeTable`].

mod headers;
#[allow(clippy::module_inception, reason = "the controller carries the module's name")]
mod response;

pub use headers::Headers;
pub use response::{Response, Version};

/// Content-type capability consulted during compression negotiation.
///
/// The table itself belongs to the serving layer; the emission core only
/// asks one question of it.
pub trait MimeTable: Send + Sync {
    /// Whether bodies of this content type are worth compressing.
    fn is_compressible(&self, content_type: &str) -> bool;
}

impl<F> MimeTable for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_compressible(&self, content_type: &str) -> bool {
        self(content_type)
    }
}
